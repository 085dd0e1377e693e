//! SNMP message and PDU construction/parsing (community-based v1/v2c; the
//! v3 USM wrapper lives in `usm.rs` and reuses the PDU encoder here).

use super::ber::{self, Value};

pub const VERSION_V1: i64 = 0;
pub const VERSION_V2C: i64 = 1;
pub const VERSION_V3: i64 = 3;

pub struct VarBind {
    pub oid: Vec<u32>,
    pub value: Value,
}

fn build_pdu(tag: u8, request_id: i32, error_fields: (i64, i64), oids: &[Vec<u32>]) -> Value {
    let varbinds = oids
        .iter()
        .map(|oid| Value::Sequence(vec![Value::Oid(oid.clone()), Value::Null]))
        .collect();
    Value::Tagged(
        tag,
        vec![
            Value::Integer(request_id as i64),
            Value::Integer(error_fields.0),
            Value::Integer(error_fields.1),
            Value::Sequence(varbinds),
        ],
    )
}

/// Builds a `GetRequest` for one or more OIDs.
pub fn build_get_request(request_id: i32, oids: &[Vec<u32>]) -> Value {
    build_pdu(ber::TAG_GET_REQUEST, request_id, (0, 0), oids)
}

/// Builds a `GetNextRequest`, used to walk a table one row at a time.
pub fn build_get_next_request(request_id: i32, oids: &[Vec<u32>]) -> Value {
    build_pdu(ber::TAG_GET_NEXT_REQUEST, request_id, (0, 0), oids)
}

/// Builds a `GetBulkRequest` (v2c/v3 only): `non_repeaters` scalar OIDs
/// followed by up to `max_repetitions` rows per remaining OID.
pub fn build_get_bulk_request(
    request_id: i32,
    non_repeaters: i64,
    max_repetitions: i64,
    oids: &[Vec<u32>],
) -> Value {
    build_pdu(
        ber::TAG_GET_BULK_REQUEST,
        request_id,
        (non_repeaters, max_repetitions),
        oids,
    )
}

/// Builds a full community-based (v1/v2c) SNMP message.
pub fn build_message_community(version: i64, community: &str, pdu: Value) -> Vec<u8> {
    let message = Value::Sequence(vec![
        Value::Integer(version),
        Value::OctetString(community.as_bytes().to_vec()),
        pdu,
    ]);
    ber::encode(&message)
}

/// Extracts the varbind list from a `GetResponse` message, keeping both the
/// outer PDU's `errorStatus`/`errorIndex` for the caller to inspect.
pub fn parse_response(bytes: &[u8]) -> Result<(i64, i64, Vec<VarBind>), String> {
    let (message, _) = ber::decode(bytes).ok_or("malformed SNMP message")?;
    let Value::Sequence(top) = message else {
        return Err("expected top-level SEQUENCE".to_string());
    };
    let pdu = top.get(2).ok_or("missing PDU")?;
    let Value::Tagged(_, fields) = pdu else {
        return Err("expected tagged PDU".to_string());
    };
    let error_status = match fields.first() {
        Some(Value::Integer(i)) => *i,
        _ => 0,
    };
    let error_index = match fields.get(1) {
        Some(Value::Integer(i)) => *i,
        _ => 0,
    };
    let Some(Value::Sequence(varbind_list)) = fields.get(2) else {
        return Err("missing varbind list".to_string());
    };
    let mut varbinds = Vec::with_capacity(varbind_list.len());
    for vb in varbind_list {
        let Value::Sequence(pair) = vb else { continue };
        let (Some(Value::Oid(oid)), Some(value)) = (pair.first(), pair.get(1)) else {
            continue;
        };
        varbinds.push(VarBind { oid: oid.clone(), value: value.clone() });
    }
    Ok((error_status, error_index, varbinds))
}
