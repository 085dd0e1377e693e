//! RouterOS response parsing helpers.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub(super) struct SystemResource {
    pub uptime: String,
    pub cpu_load: u64,
    pub free_memory: u64,
    pub total_memory: u64,
    pub version: String,
    pub board_name: String,
}

pub(super) fn parse_system(sentences: &[HashMap<String, String>]) -> SystemResource {
    let first_opt = sentences.iter().find(|s| s.contains_key("version"));
    let empty = HashMap::new();
    let first = first_opt.unwrap_or(&empty);
    SystemResource {
        uptime: first.get("uptime").cloned().unwrap_or_else(|| "0s".to_string()),
        cpu_load: first.get("cpu-load").and_then(|v| v.parse().ok()).unwrap_or(0),
        free_memory: first.get("free-memory").and_then(|v| v.parse().ok()).unwrap_or(0),
        total_memory: first.get("total-memory").and_then(|v| v.parse().ok()).unwrap_or(0),
        version: first.get("version").cloned().unwrap_or_else(|| "unknown".to_string()),
        board_name: first.get("board-name").cloned().unwrap_or_else(|| "unknown".to_string()),
    }
}

#[derive(Debug, Clone)]
pub(super) struct RawInterface {
    pub name: String,
    pub default_name: Option<String>,
    pub comment: Option<String>,
    pub running: bool,
}

pub(super) fn parse_interfaces(sentences: &[HashMap<String, String>]) -> Vec<RawInterface> {
    sentences
        .iter()
        .filter_map(|s| {
            let name = s.get("name")?.clone();
            Some(RawInterface {
                name,
                default_name: s.get("default-name").cloned(),
                comment: s.get("comment").cloned(),
                running: s.get("running").is_some_and(|v| v == "true"),
            })
        })
        .collect()
}

/// Parses an `/ip/address/print` reply into IPAM observations. Each
/// sentence carries `address` as `ip/prefix` (e.g. `10.0.0.1/24`) and an
/// `interface` name; `disabled` and `comment` pass through verbatim.
pub(super) fn parse_addresses(
    sentences: &[HashMap<String, String>],
) -> Vec<crate::adapters::InterfaceAddressObservation> {
    sentences
        .iter()
        .filter_map(|s| {
            let address = s.get("address")?;
            let (ip, prefix_len) = match address.split_once('/') {
                Some((ip, prefix)) => (ip.to_string(), prefix.parse::<u8>().ok()),
                None => (address.clone(), None),
            };
            let interface_name = s.get("interface").cloned().unwrap_or_default();
            Some(crate::adapters::InterfaceAddressObservation {
                interface_name,
                ip_address: ip,
                prefix_len,
                disabled: s.get("disabled").is_some_and(|v| v == "true"),
                comment: s.get("comment").cloned(),
            })
        })
        .collect()
}

/// Reads the active link speed out of an `/interface/monitor-traffic`-style
/// reply, preferring `speed` and falling back to `rate`.
pub(super) fn parse_monitor_speed(sentences: &[HashMap<String, String>]) -> Option<String> {
    sentences
        .first()
        .and_then(|s| s.get("speed").or_else(|| s.get("rate")))
        .cloned()
}

/// Parses a MikroTik uptime string (`1d2h3m4s`, `2w1d`, `05:23:10`, `30s`)
/// into seconds.
pub(super) fn parse_uptime_to_seconds(s: &str) -> u64 {
    if s.contains(':') {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() == 3 {
            let h = parts[0].parse::<u64>().unwrap_or(0);
            let m = parts[1].parse::<u64>().unwrap_or(0);
            let sec = parts[2].parse::<u64>().unwrap_or(0);
            return h * 3600 + m * 60 + sec;
        } else if parts.len() == 2 {
            let m = parts[0].parse::<u64>().unwrap_or(0);
            let sec = parts[1].parse::<u64>().unwrap_or(0);
            return m * 60 + sec;
        }
    }
    let mut total = 0u64;
    let mut num = String::new();
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            num.push(ch);
            continue;
        }
        if num.is_empty() {
            continue;
        }
        let value = num.parse::<u64>().unwrap_or(0);
        let unit_seconds = match ch {
            'w' => 7 * 24 * 3600,
            'd' => 24 * 3600,
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => 0,
        };
        total += value * unit_seconds;
        num.clear();
    }
    if !num.is_empty() {
        total += num.parse::<u64>().unwrap_or(0);
    }
    total
}
