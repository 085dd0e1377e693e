//! RouterOS API adapter for `mikrotik_router`/`mikrotik_switch` devices.
//!
//! Generalizes the wire protocol and login handshake to the per-device
//! credential resolution and detailed/quick probe split.

mod auth;
mod connection;
mod parse;
mod protocol;

pub use protocol::encode_length;

use connection::RouterOsConnection;

use crate::credentials::MikrotikCredentials;
use crate::storage::model::PortStatus;

use super::{ProbeOptions, ProbeResult};

use secrecy::ExposeSecret;

pub async fn probe(
    ip_address: &str,
    port: u16,
    credentials: &MikrotikCredentials,
    options: &ProbeOptions,
) -> ProbeResult {
    let addr = format!("{ip_address}:{port}");
    let mut conn = match RouterOsConnection::connect(&addr).await {
        Ok(c) => c,
        Err(e) => return ProbeResult::failure(format!("connect failed: {e}")),
    };

    if let Err(e) = conn
        .login(&credentials.username, credentials.password.expose_secret())
        .await
    {
        return ProbeResult::failure(format!("login failed: {e}"));
    }

    let identity_sentences = match conn.command("/system/identity/print", &[]).await {
        Ok(s) => s,
        Err(e) => return ProbeResult::failure(format!("identity query failed: {e}")),
    };
    let identity = identity_sentences.first().and_then(|s| s.get("name")).cloned();

    let resource_sentences = match conn.command("/system/resource/print", &[]).await {
        Ok(s) => s,
        Err(e) => return ProbeResult::failure(format!("resource query failed: {e}")),
    };
    let resource = parse::parse_system(&resource_sentences);

    let interface_sentences = match conn.command("/interface/print", &[]).await {
        Ok(s) => s,
        Err(e) => return ProbeResult::failure(format!("interface query failed: {e}")),
    };
    let raw_interfaces = parse::parse_interfaces(&interface_sentences);

    let interface_addresses = match conn.command("/ip/address/print", &[]).await {
        Ok(sentences) => parse::parse_addresses(&sentences),
        Err(e) => {
            tracing::debug!(ip_address, error = %e, "address query failed, continuing without IPAM observations");
            Vec::new()
        }
    };

    let mut measured_speeds: std::collections::HashMap<String, String> = std::collections::HashMap::new();
    if options.detailed {
        for iface in &raw_interfaces {
            let args = [format!("=interface={}", iface.name), "=once=".to_string()];
            if let Ok(sentences) = conn.command("/interface/monitor-traffic", &args).await {
                if let Some(speed) = parse::parse_monitor_speed(&sentences) {
                    measured_speeds.insert(iface.name.clone(), speed);
                }
            }
        }
    }

    let memory_usage_pct = if resource.total_memory > 0 {
        Some(
            ((resource.total_memory.saturating_sub(resource.free_memory)) as f64
                / resource.total_memory as f64
                * 100.0)
                .round(),
        )
    } else {
        None
    };

    let ports = raw_interfaces
        .into_iter()
        .map(|iface| {
            let cached = options
                .previous_ports
                .iter()
                .find(|p| {
                    iface
                        .default_name
                        .as_deref()
                        .is_some_and(|d| p.default_name.as_deref() == Some(d))
                        || p.name == iface.name
                });
            let speed = measured_speeds
                .get(&iface.name)
                .cloned()
                .or_else(|| cached.and_then(|p| p.speed.clone()));
            PortStatus {
                name: iface.name,
                default_name: iface.default_name,
                comment: iface.comment,
                up: iface.running,
                speed,
            }
        })
        .collect();

    ProbeResult {
        success: true,
        identity,
        model: Some(resource.board_name),
        version: Some(resource.version),
        uptime_seconds: Some(parse::parse_uptime_to_seconds(&resource.uptime)),
        cpu_usage_pct: Some(resource.cpu_load as f64),
        memory_usage_pct,
        disk_usage_pct: None,
        ports,
        custom_metrics: std::collections::HashMap::new(),
        interface_addresses,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_length_reexported() {
        assert_eq!(encode_length(1), vec![1]);
    }
}
