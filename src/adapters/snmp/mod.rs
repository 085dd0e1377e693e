//! SNMP v1/v2c/v3 adapter for `generic_snmp`, `access_point`, and SNMP-backed
//! `server` devices.

mod ber;
mod pdu;
mod usm;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use secrecy::ExposeSecret;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::credentials::{SnmpCredentials, SnmpVersion};
use crate::storage::model::PortStatus;

use super::ProbeResult;
use ber::Value;

const SOCKET_TIMEOUT: Duration = Duration::from_secs(4);

const OID_SYS_DESCR: &str = "1.3.6.1.2.1.1.1.0";
const OID_SYS_UPTIME: &str = "1.3.6.1.2.1.1.3.0";
const OID_SYS_NAME: &str = "1.3.6.1.2.1.1.5.0";
const OID_HR_PROCESSOR_LOAD: &str = "1.3.6.1.2.1.25.3.3.1.2";
const OID_HR_STORAGE_TYPE: &str = "1.3.6.1.2.1.25.2.3.1.2";
const OID_HR_STORAGE_SIZE: &str = "1.3.6.1.2.1.25.2.3.1.5";
const OID_HR_STORAGE_USED: &str = "1.3.6.1.2.1.25.2.3.1.6";
const HR_STORAGE_RAM: &str = "1.3.6.1.2.1.25.2.1.2";
const HR_STORAGE_FIXED_DISK: &str = "1.3.6.1.2.1.25.2.1.4";
const OID_IF_DESCR: &str = "1.3.6.1.2.1.2.2.1.2";
const OID_IF_SPEED: &str = "1.3.6.1.2.1.2.2.1.5";
const OID_IF_PHYS_ADDRESS: &str = "1.3.6.1.2.1.2.2.1.6";
const OID_IF_HC_IN_OCTETS: &str = "1.3.6.1.2.1.31.1.1.1.6";
const OID_IF_HC_OUT_OCTETS: &str = "1.3.6.1.2.1.31.1.1.1.10";
const OID_IF_IN_OCTETS: &str = "1.3.6.1.2.1.2.2.1.10";
const OID_IF_OUT_OCTETS: &str = "1.3.6.1.2.1.2.2.1.16";

struct Session {
    socket: UdpSocket,
    target: SocketAddr,
    credentials: SnmpCredentials,
    closed: bool,
}

impl Session {
    async fn open(ip_address: &str, port: u16, credentials: &SnmpCredentials) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let target: SocketAddr = format!("{ip_address}:{port}").parse().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid SNMP target address")
        })?;
        socket.connect(target).await?;
        Ok(Self { socket, target, credentials: credentials.clone(), closed: false })
    }

    /// Idempotent close: safe to call more than once, including after a
    /// worker has already abandoned the probe on deadline expiry.
    fn close(&mut self) {
        self.closed = true;
    }

    async fn request(&self, pdu: Value) -> Result<(i64, i64, Vec<pdu::VarBind>), String> {
        let bytes = match self.credentials.version {
            SnmpVersion::V1 | SnmpVersion::V2c => {
                let version = if self.credentials.version == SnmpVersion::V1 {
                    pdu::VERSION_V1
                } else {
                    pdu::VERSION_V2C
                };
                let community = self
                    .credentials
                    .community
                    .as_ref()
                    .map(|c| c.expose_secret().to_string())
                    .unwrap_or_default();
                pdu::build_message_community(version, &community, pdu)
            }
            SnmpVersion::V3 => return self.request_v3(pdu).await,
        };

        let response = timeout(SOCKET_TIMEOUT, async {
            self.socket.send(&bytes).await.map_err(|e| e.to_string())?;
            let mut buf = vec![0u8; 65535];
            let n = self.socket.recv(&mut buf).await.map_err(|e| e.to_string())?;
            buf.truncate(n);
            Ok::<_, String>(buf)
        })
        .await
        .map_err(|_| "SNMP request timed out".to_string())??;

        pdu::parse_response(&response)
    }

    /// SNMPv3 authPriv exchange: a discovery round-trip to learn the
    /// engine ID/boots/time, then the authenticated (and encrypted, when a
    /// privacy protocol is configured) request.
    async fn request_v3(&self, inner_pdu: Value) -> Result<(i64, i64, Vec<pdu::VarBind>), String> {
        let v3 = self
            .credentials
            .v3
            .as_ref()
            .ok_or("SNMPv3 credentials missing authPriv parameters")?;

        // Discovery: an unauthenticated request with an empty engine ID
        // elicits a report carrying the agent's engine ID, boots, and time.
        let discovery = build_v3_message(&[], 0, 0, b"", None, inner_pdu.clone())?;
        let discovery_reply = self.round_trip(&discovery).await?;
        let (engine_id, boots, engine_time) = parse_v3_engine_params(&discovery_reply)?;

        let auth_key = usm::localize_key(v3.auth_protocol, v3.auth_password.expose_secret().as_bytes(), &engine_id);
        let priv_key = usm::localize_key(v3.auth_protocol, v3.priv_password.expose_secret().as_bytes(), &engine_id);

        let authenticated = build_v3_message(
            &engine_id,
            boots,
            engine_time,
            v3.username.as_bytes(),
            Some((v3, &auth_key, &priv_key)),
            inner_pdu,
        )?;
        let response = self.round_trip(&authenticated).await?;
        pdu::parse_response(&response)
    }

    async fn round_trip(&self, bytes: &[u8]) -> Result<Vec<u8>, String> {
        timeout(SOCKET_TIMEOUT, async {
            self.socket.send(bytes).await.map_err(|e| e.to_string())?;
            let mut buf = vec![0u8; 65535];
            let n = self.socket.recv(&mut buf).await.map_err(|e| e.to_string())?;
            buf.truncate(n);
            Ok::<_, String>(buf)
        })
        .await
        .map_err(|_| "SNMPv3 request timed out".to_string())?
    }
}

fn build_v3_message(
    engine_id: &[u8],
    boots: u32,
    engine_time: u32,
    username: &[u8],
    auth_priv: Option<(&crate::credentials::SnmpV3Auth, &[u8], &[u8])>,
    pdu: Value,
) -> Result<Vec<u8>, String> {
    let message_id: i32 = rand::thread_rng().gen_range(1..i32::MAX);
    let flags: u8 = if auth_priv.is_some() { 0x03 } else { 0x00 };

    let (scoped_pdu_bytes, priv_salt) = match auth_priv {
        Some((v3, _auth_key, priv_key)) => {
            let scoped = Value::Sequence(vec![
                Value::OctetString(engine_id.to_vec()),
                Value::OctetString(Vec::new()),
                pdu,
            ]);
            let plaintext = ber::encode(&scoped);
            let (cipher, salt) = usm::encrypt(v3.priv_protocol, priv_key, boots, engine_time, &plaintext);
            (ber::encode(&Value::OctetString(cipher)), salt.to_vec())
        }
        None => {
            let scoped = Value::Sequence(vec![
                Value::OctetString(engine_id.to_vec()),
                Value::OctetString(Vec::new()),
                pdu,
            ]);
            (ber::encode(&scoped), Vec::new())
        }
    };

    let usm_params = Value::Sequence(vec![
        Value::OctetString(engine_id.to_vec()),
        Value::Integer(boots as i64),
        Value::Integer(engine_time as i64),
        Value::OctetString(username.to_vec()),
        Value::OctetString(vec![0u8; 12]),
        Value::OctetString(priv_salt),
    ]);

    let header = Value::Sequence(vec![
        Value::Integer(message_id as i64),
        Value::Integer(65507),
        Value::OctetString(vec![flags]),
        Value::Integer(3),
    ]);

    let mut message = Value::Sequence(vec![
        Value::Integer(pdu::VERSION_V3),
        header,
        Value::OctetString(ber::encode(&usm_params)),
        Value::Tagged(0xA3, vec![scoped_pdu_wrapped(scoped_pdu_bytes, auth_priv.is_some())]),
    ]);

    if let Some((v3, auth_key, _)) = auth_priv {
        let mut encoded = ber::encode(&message);
        let digest = usm::authenticate(v3.auth_protocol, auth_key, &encoded);
        splice_auth_digest(&mut encoded, &digest);
        return Ok(encoded);
    }

    let _ = &mut message;
    Ok(ber::encode(&message))
}

fn scoped_pdu_wrapped(bytes: Vec<u8>, encrypted: bool) -> Value {
    if encrypted {
        Value::OctetString(bytes)
    } else {
        // `bytes` is already a fully-encoded SEQUENCE; re-decode so it nests
        // as a structured value rather than double-wrapping an OCTET STRING.
        ber::decode(&bytes).map(|(v, _)| v).unwrap_or(Value::Null)
    }
}

/// Patches the 12 zero auth-digest bytes in a serialized v3 message in
/// place, after the whole message (with zeroed digest) has been hashed.
fn splice_auth_digest(message: &mut [u8], digest: &[u8; 12]) {
    let zeros = [0u8; 12];
    if let Some(pos) = message.windows(12).position(|w| w == zeros) {
        message[pos..pos + 12].copy_from_slice(digest);
    }
}

fn parse_v3_engine_params(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32), String> {
    let (message, _) = ber::decode(bytes).ok_or("malformed SNMPv3 discovery reply")?;
    let Value::Sequence(top) = message else {
        return Err("expected top-level SEQUENCE".to_string());
    };
    let Some(Value::OctetString(usm_bytes)) = top.get(2) else {
        return Err("missing USM security parameters".to_string());
    };
    let (usm_value, _) = ber::decode(usm_bytes).ok_or("malformed USM security parameters")?;
    let Value::Sequence(fields) = usm_value else {
        return Err("expected USM SEQUENCE".to_string());
    };
    let engine_id = match fields.first() {
        Some(Value::OctetString(b)) => b.clone(),
        _ => return Err("missing engine ID".to_string()),
    };
    let boots = match fields.get(1) {
        Some(Value::Integer(i)) => *i as u32,
        _ => 0,
    };
    let engine_time = match fields.get(2) {
        Some(Value::Integer(i)) => *i as u32,
        _ => 0,
    };
    Ok((engine_id, boots, engine_time))
}

fn oid_scalar(dotted: &str) -> Vec<u32> {
    ber::parse_oid(dotted)
}

/// Walks a table column via repeated GETNEXT, stopping when the returned
/// OID leaves the requested column's prefix or the agent reports
/// end-of-MIB-view.
async fn walk_column(session: &Session, column_oid: &str) -> Vec<(Vec<u32>, Value)> {
    let base = oid_scalar(column_oid);
    let mut current = base.clone();
    let mut out = Vec::new();
    let mut request_id: i32 = rand::thread_rng().gen_range(1..i32::MAX);

    for _ in 0..256 {
        let pdu = pdu::build_get_next_request(request_id, &[current.clone()]);
        request_id = request_id.wrapping_add(1);
        let Ok((_, _, varbinds)) = session.request(pdu).await else { break };
        let Some(vb) = varbinds.into_iter().next() else { break };
        if !vb.oid.starts_with(&base) {
            break;
        }
        if matches!(vb.value, Value::EndOfMibView) {
            break;
        }
        current = vb.oid.clone();
        out.push((vb.oid, vb.value));
    }
    out
}

fn last_index(oid: &[u32], base_len: usize) -> Vec<u32> {
    oid[base_len..].to_vec()
}

fn format_speed_bps(bps: u64) -> String {
    const TERA: f64 = 1e12;
    const GIGA: f64 = 1e9;
    const MEGA: f64 = 1e6;
    const KILO: f64 = 1e3;
    let bps = bps as f64;
    if bps >= TERA {
        format!("{:.2}Tbps", bps / TERA)
    } else if bps >= GIGA {
        format!("{:.2}Gbps", bps / GIGA)
    } else if bps >= MEGA {
        format!("{:.2}Mbps", bps / MEGA)
    } else if bps >= KILO {
        format!("{:.2}Kbps", bps / KILO)
    } else {
        format!("{bps:.0}bps")
    }
}

pub async fn probe(ip_address: &str, port: u16, credentials: &SnmpCredentials) -> ProbeResult {
    let mut session = match Session::open(ip_address, port, credentials).await {
        Ok(s) => s,
        Err(e) => return ProbeResult::failure(format!("socket open failed: {e}")),
    };

    let scalar_pdu = pdu::build_get_request(
        1,
        &[oid_scalar(OID_SYS_DESCR), oid_scalar(OID_SYS_UPTIME), oid_scalar(OID_SYS_NAME)],
    );
    let scalars = match session.request(scalar_pdu).await {
        Ok((_, _, vb)) => vb,
        Err(e) => {
            session.close();
            return ProbeResult::failure(format!("scalar GET failed: {e}"));
        }
    };

    let mut identity = None;
    let mut version = None;
    let mut uptime_seconds = None;
    for vb in &scalars {
        if vb.oid == oid_scalar(OID_SYS_NAME) {
            if let Value::OctetString(b) = &vb.value {
                identity = Some(String::from_utf8_lossy(b).to_string());
            }
        }
        if vb.oid == oid_scalar(OID_SYS_DESCR) {
            if let Value::OctetString(b) = &vb.value {
                version = Some(String::from_utf8_lossy(b).to_string());
            }
        }
        if vb.oid == oid_scalar(OID_SYS_UPTIME) {
            if let Value::TimeTicks(t) = &vb.value {
                uptime_seconds = Some(u64::from(*t) / 100);
            }
        }
    }

    let cpu_loads = walk_column(&session, OID_HR_PROCESSOR_LOAD).await;
    let cpu_usage_pct = if cpu_loads.is_empty() {
        None
    } else {
        let values: Vec<f64> = cpu_loads
            .iter()
            .filter_map(|(_, v)| match v {
                Value::Integer(i) => Some(*i as f64),
                Value::Gauge32(g) => Some(*g as f64),
                _ => None,
            })
            .filter(|v| (0.0..=100.0).contains(v))
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    };

    let storage_types = walk_column(&session, OID_HR_STORAGE_TYPE).await;
    let storage_sizes = walk_column(&session, OID_HR_STORAGE_SIZE).await;
    let storage_used = walk_column(&session, OID_HR_STORAGE_USED).await;
    let (memory_usage_pct, disk_usage_pct) =
        derive_storage_percentages(&storage_types, &storage_sizes, &storage_used);

    let if_descr = walk_column(&session, OID_IF_DESCR).await;
    let if_speed = walk_column(&session, OID_IF_SPEED).await;
    let if_phys = walk_column(&session, OID_IF_PHYS_ADDRESS).await;
    let ports = build_port_list(&if_descr, &if_speed, &if_phys);

    session.close();

    ProbeResult {
        success: true,
        identity,
        model: None,
        version,
        uptime_seconds,
        cpu_usage_pct,
        memory_usage_pct,
        disk_usage_pct,
        ports,
        custom_metrics: HashMap::new(),
        interface_addresses: Vec::new(),
        error: None,
    }
}

fn derive_storage_percentages(
    types: &[(Vec<u32>, Value)],
    sizes: &[(Vec<u32>, Value)],
    used: &[(Vec<u32>, Value)],
) -> (Option<f64>, Option<f64>) {
    let type_base = oid_scalar(OID_HR_STORAGE_TYPE).len();
    let ram_oid = oid_scalar(HR_STORAGE_RAM);
    let disk_oid = oid_scalar(HR_STORAGE_FIXED_DISK);

    let mut memory_pct = None;
    let mut disk_pct = None;

    for (oid, value) in types {
        let Value::Oid(type_value) = value else { continue };
        let index = last_index(oid, type_base);
        let pct = |size_col: &[(Vec<u32>, Value)], used_col: &[(Vec<u32>, Value)]| -> Option<f64> {
            let size = find_by_index(size_col, &index)?;
            let used = find_by_index(used_col, &index)?;
            if size == 0.0 {
                None
            } else {
                Some((used / size * 100.0).round())
            }
        };
        if memory_pct.is_none() && type_value == &ram_oid {
            memory_pct = pct(sizes, used);
        }
        if disk_pct.is_none() && type_value == &disk_oid {
            disk_pct = pct(sizes, used);
        }
        if memory_pct.is_some() && disk_pct.is_some() {
            break;
        }
    }
    (memory_pct, disk_pct)
}

fn find_by_index(column: &[(Vec<u32>, Value)], index: &[u32]) -> Option<f64> {
    let base_len = column.first().map(|(oid, _)| oid.len() - index.len())?;
    column.iter().find_map(|(oid, value)| {
        if last_index(oid, base_len) == index {
            match value {
                Value::Integer(i) => Some(*i as f64),
                Value::Gauge32(g) => Some(*g as f64),
                Value::Counter32(c) => Some(*c as f64),
                _ => None,
            }
        } else {
            None
        }
    })
}

fn build_port_list(
    descr: &[(Vec<u32>, Value)],
    speed: &[(Vec<u32>, Value)],
    phys: &[(Vec<u32>, Value)],
) -> Vec<PortStatus> {
    let base_len = oid_scalar(OID_IF_DESCR).len();
    descr
        .iter()
        .take(10)
        .filter_map(|(oid, value)| {
            let Value::OctetString(name_bytes) = value else { return None };
            let index = last_index(oid, base_len);
            let name = String::from_utf8_lossy(name_bytes).to_string();
            let speed_bps = find_by_index(speed, &index);
            let mac = find_mac(phys, &index);
            Some(PortStatus {
                name,
                default_name: None,
                comment: mac,
                up: true,
                speed: speed_bps.map(|bps| format_speed_bps(bps as u64)),
            })
        })
        .collect()
}

fn find_mac(phys: &[(Vec<u32>, Value)], index: &[u32]) -> Option<String> {
    let base_len = phys.first().map(|(oid, _)| oid.len() - index.len())?;
    phys.iter().find_map(|(oid, value)| {
        if last_index(oid, base_len) == index {
            match value {
                Value::OctetString(b) => Some(hex::encode(b)),
                _ => None,
            }
        } else {
            None
        }
    })
}

/// Samples 64-bit (falling back to 32-bit) traffic counters for a single
/// interface, matched by name case-insensitively and substring-tolerant in
/// both directions.
pub async fn probe_interface_counters(
    ip_address: &str,
    port: u16,
    credentials: &SnmpCredentials,
    interface_name: &str,
) -> Result<super::CounterSample, String> {
    let session = Session::open(ip_address, port, credentials)
        .await
        .map_err(|e| e.to_string())?;

    let descr = walk_column(&session, OID_IF_DESCR).await;
    let base_len = oid_scalar(OID_IF_DESCR).len();
    let needle = interface_name.to_lowercase();
    let matched_index = descr.iter().find_map(|(oid, value)| {
        let Value::OctetString(name_bytes) = value else { return None };
        let name = String::from_utf8_lossy(name_bytes).to_lowercase();
        if name.contains(&needle) || needle.contains(&name) {
            Some(last_index(oid, base_len))
        } else {
            None
        }
    });
    let Some(index) = matched_index else {
        return Err(format!("no interface matching '{interface_name}'"));
    };

    let hc_in = walk_column(&session, OID_IF_HC_IN_OCTETS).await;
    let hc_out = walk_column(&session, OID_IF_HC_OUT_OCTETS).await;
    let (in_octets, out_octets) = match (find_by_index(&hc_in, &index), find_by_index(&hc_out, &index)) {
        (Some(i), Some(o)) => (i as u64, o as u64),
        _ => {
            let plain_in = walk_column(&session, OID_IF_IN_OCTETS).await;
            let plain_out = walk_column(&session, OID_IF_OUT_OCTETS).await;
            let i = find_by_index(&plain_in, &index).ok_or("missing ifInOctets")? as u64;
            let o = find_by_index(&plain_out, &index).ok_or("missing ifOutOctets")? as u64;
            (i, o)
        }
    };

    Ok(super::CounterSample { in_octets, out_octets, taken_at: chrono::Utc::now() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_speed_bps_units() {
        assert_eq!(format_speed_bps(500), "500bps");
        assert_eq!(format_speed_bps(1_500), "1.50Kbps");
        assert_eq!(format_speed_bps(1_500_000), "1.50Mbps");
        assert_eq!(format_speed_bps(1_500_000_000), "1.50Gbps");
    }

    #[test]
    fn last_index_strips_base() {
        assert_eq!(last_index(&[1, 3, 6, 1, 2, 1, 2, 2, 1, 2, 7], 10), vec![7]);
    }
}
