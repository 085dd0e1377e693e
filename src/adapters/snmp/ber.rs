//! Minimal hand-rolled BER/DER encode and decode, covering exactly the ASN.1
//! types SNMP messages use. Same philosophy as the RouterOS wire format
//! elsewhere in this crate: write the wire protocol by hand rather than
//! pull in an opaque SNMP crate.

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_GET_REQUEST: u8 = 0xA0;
pub const TAG_GET_NEXT_REQUEST: u8 = 0xA1;
pub const TAG_GET_RESPONSE: u8 = 0xA2;
pub const TAG_GET_BULK_REQUEST: u8 = 0xA5;
pub const TAG_COUNTER32: u8 = 0x41;
pub const TAG_GAUGE32: u8 = 0x42;
pub const TAG_TIME_TICKS: u8 = 0x43;
pub const TAG_COUNTER64: u8 = 0x46;
pub const TAG_NO_SUCH_OBJECT: u8 = 0x80;
pub const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
pub const TAG_END_OF_MIB_VIEW: u8 = 0x82;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    Oid(Vec<u32>),
    Sequence(Vec<Value>),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
    /// Tagged container used for PDUs (tag, inner sequence contents).
    Tagged(u8, Vec<Value>),
}

fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else {
        let mut bytes = Vec::new();
        let mut n = len;
        while n > 0 {
            bytes.insert(0, (n & 0xFF) as u8);
            n >>= 8;
        }
        let mut out = vec![0x80 | bytes.len() as u8];
        out.extend(bytes);
        out
    }
}

fn encode_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(encode_length(content.len()));
    out.extend_from_slice(content);
    out
}

fn encode_integer_bytes(mut value: i64) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }
    let negative = value < 0;
    let mut bytes = Vec::new();
    if negative {
        value = !value;
    }
    while value != 0 {
        bytes.insert(0, (value & 0xFF) as u8);
        value >>= 8;
    }
    if negative {
        for b in &mut bytes {
            *b = !*b;
        }
        let mut carry = 1u16;
        for b in bytes.iter_mut().rev() {
            let sum = *b as u16 + carry;
            *b = (sum & 0xFF) as u8;
            carry = sum >> 8;
        }
        if bytes[0] & 0x80 == 0 {
            bytes.insert(0, 0xFF);
        }
    } else if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    bytes
}

fn encode_uint_bytes(mut value: u64) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }
    let mut bytes = Vec::new();
    while value != 0 {
        bytes.insert(0, (value & 0xFF) as u8);
        value >>= 8;
    }
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    bytes
}

fn encode_oid(oid: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    if oid.len() < 2 {
        return out;
    }
    out.push((oid[0] * 40 + oid[1]) as u8);
    for &component in &oid[2..] {
        if component < 0x80 {
            out.push(component as u8);
        } else {
            let mut chunks = Vec::new();
            let mut n = component;
            chunks.push((n & 0x7F) as u8);
            n >>= 7;
            while n > 0 {
                chunks.push(((n & 0x7F) as u8) | 0x80);
                n >>= 7;
            }
            chunks.reverse();
            out.extend(chunks);
        }
    }
    out
}

pub fn encode(value: &Value) -> Vec<u8> {
    match value {
        Value::Integer(i) => encode_tlv(TAG_INTEGER, &encode_integer_bytes(*i)),
        Value::OctetString(bytes) => encode_tlv(TAG_OCTET_STRING, bytes),
        Value::Null => encode_tlv(TAG_NULL, &[]),
        Value::Oid(components) => encode_tlv(TAG_OID, &encode_oid(components)),
        Value::Sequence(items) => {
            let content: Vec<u8> = items.iter().flat_map(encode).collect();
            encode_tlv(TAG_SEQUENCE, &content)
        }
        Value::Counter32(v) => encode_tlv(TAG_COUNTER32, &encode_uint_bytes(*v as u64)),
        Value::Gauge32(v) => encode_tlv(TAG_GAUGE32, &encode_uint_bytes(*v as u64)),
        Value::TimeTicks(v) => encode_tlv(TAG_TIME_TICKS, &encode_uint_bytes(*v as u64)),
        Value::Counter64(v) => encode_tlv(TAG_COUNTER64, &encode_uint_bytes(*v)),
        Value::NoSuchObject => encode_tlv(TAG_NO_SUCH_OBJECT, &[]),
        Value::NoSuchInstance => encode_tlv(TAG_NO_SUCH_INSTANCE, &[]),
        Value::EndOfMibView => encode_tlv(TAG_END_OF_MIB_VIEW, &[]),
        Value::Tagged(tag, items) => {
            let content: Vec<u8> = items.iter().flat_map(encode).collect();
            encode_tlv(*tag, &content)
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn read_u8(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn read_length(&mut self) -> Option<usize> {
        let first = self.read_u8()?;
        if first & 0x80 == 0 {
            return Some(first as usize);
        }
        let n = (first & 0x7F) as usize;
        let mut len = 0usize;
        for _ in 0..n {
            len = (len << 8) | self.read_u8()? as usize;
        }
        Some(len)
    }

    fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let slice = self.bytes.get(self.pos..self.pos + len)?;
        self.pos += len;
        Some(slice)
    }
}

fn decode_oid(bytes: &[u8]) -> Vec<u32> {
    if bytes.is_empty() {
        return Vec::new();
    }
    let mut out = vec![(bytes[0] / 40) as u32, (bytes[0] % 40) as u32];
    let mut value: u32 = 0;
    for &b in &bytes[1..] {
        value = (value << 7) | (b & 0x7F) as u32;
        if b & 0x80 == 0 {
            out.push(value);
            value = 0;
        }
    }
    out
}

fn decode_int(bytes: &[u8]) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let negative = bytes[0] & 0x80 != 0;
    let mut value: i64 = if negative { -1 } else { 0 };
    for &b in bytes {
        value = (value << 8) | b as i64;
    }
    value
}

fn decode_uint(bytes: &[u8]) -> u64 {
    let mut value: u64 = 0;
    for &b in bytes {
        value = (value << 8) | b as u64;
    }
    value
}

pub fn decode(bytes: &[u8]) -> Option<(Value, usize)> {
    let mut cursor = Cursor { bytes, pos: 0 };
    let tag = cursor.read_u8()?;
    let len = cursor.read_length()?;
    let content = cursor.read_bytes(len)?;
    let value = match tag {
        TAG_INTEGER => Value::Integer(decode_int(content)),
        TAG_OCTET_STRING => Value::OctetString(content.to_vec()),
        TAG_NULL => Value::Null,
        TAG_OID => Value::Oid(decode_oid(content)),
        TAG_COUNTER32 => Value::Counter32(decode_uint(content) as u32),
        TAG_GAUGE32 => Value::Gauge32(decode_uint(content) as u32),
        TAG_TIME_TICKS => Value::TimeTicks(decode_uint(content) as u32),
        TAG_COUNTER64 => Value::Counter64(decode_uint(content)),
        TAG_NO_SUCH_OBJECT => Value::NoSuchObject,
        TAG_NO_SUCH_INSTANCE => Value::NoSuchInstance,
        TAG_END_OF_MIB_VIEW => Value::EndOfMibView,
        TAG_SEQUENCE => Value::Sequence(decode_sequence_items(content)),
        other => Value::Tagged(other, decode_sequence_items(content)),
    };
    Some((value, cursor.pos))
}

fn decode_sequence_items(bytes: &[u8]) -> Vec<Value> {
    let mut items = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        match decode(&bytes[offset..]) {
            Some((value, consumed)) => {
                items.push(value);
                offset += consumed;
            }
            None => break,
        }
    }
    items
}

pub fn parse_oid(dotted: &str) -> Vec<u32> {
    dotted
        .trim_start_matches('.')
        .split('.')
        .filter_map(|c| c.parse().ok())
        .collect()
}

pub fn format_oid(oid: &[u32]) -> String {
    oid.iter().map(ToString::to_string).collect::<Vec<_>>().join(".")
}
