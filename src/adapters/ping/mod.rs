//! ICMP batch adapter: wraps an external `fping`-compatible batch-ping
//! tool rather than opening raw ICMP sockets, since raw sockets need
//! elevated privileges the monitoring process shouldn't require.

use std::collections::HashMap;
use std::process::Stdio;

use tokio::process::Command;

/// One target's raw per-packet round-trip times, `None` entries marking
/// lost packets. Percentile/loss statistics are computed by the caller
/// (`scheduler::ping`), not here — this module only runs the tool and
/// parses its output.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPingSamples {
    pub ip_address: String,
    pub rtts_ms: Vec<Option<f64>>,
}

/// Invokes the batch-ping tool once against every target, requesting
/// `probe_count` packets per target with the given per-packet timeout.
pub async fn batch_ping(
    tool_path: &str,
    targets: &[String],
    probe_count: u32,
    packet_timeout_ms: u64,
) -> Result<Vec<RawPingSamples>, String> {
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let output = Command::new(tool_path)
        .arg("-C")
        .arg(probe_count.to_string())
        .arg("-q")
        .arg("-t")
        .arg(packet_timeout_ms.to_string())
        .arg("-p")
        .arg("10")
        .args(targets)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| format!("failed to spawn {tool_path}: {e}"))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    Ok(parse_batch_output(&stderr))
}

/// Parses `fping -C N -q` stderr output: one line per target in the form
/// `IP : rtt1 rtt2 ... rttN`, with `-` marking a lost packet.
fn parse_batch_output(stderr: &str) -> Vec<RawPingSamples> {
    let mut by_ip: HashMap<String, Vec<Option<f64>>> = HashMap::new();
    let mut order = Vec::new();

    for line in stderr.lines() {
        let Some((ip_part, samples_part)) = line.split_once(':') else { continue };
        let ip = ip_part.trim().to_string();
        if ip.is_empty() {
            continue;
        }
        let rtts: Vec<Option<f64>> = samples_part
            .split_whitespace()
            .map(|token| if token == "-" { None } else { token.parse::<f64>().ok() })
            .collect();
        if !by_ip.contains_key(&ip) {
            order.push(ip.clone());
        }
        by_ip.insert(ip, rtts);
    }

    order
        .into_iter()
        .map(|ip| {
            let rtts_ms = by_ip.remove(&ip).unwrap_or_default();
            RawPingSamples { ip_address: ip, rtts_ms }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_success_and_loss() {
        let stderr = "10.0.0.1 : 4.51 4.80 5.02\n10.0.0.2 : 5.10 - -\n10.0.0.3 : - - -\n";
        let parsed = parse_batch_output(stderr);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].ip_address, "10.0.0.1");
        assert_eq!(parsed[0].rtts_ms, vec![Some(4.51), Some(4.80), Some(5.02)]);
        assert_eq!(parsed[1].rtts_ms, vec![Some(5.10), None, None]);
        assert_eq!(parsed[2].rtts_ms, vec![None, None, None]);
    }

    #[test]
    fn ignores_unparsable_lines() {
        let stderr = "some unrelated fping banner line\n10.0.0.1 : 1.0 2.0\n";
        let parsed = parse_batch_output(stderr);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].ip_address, "10.0.0.1");
    }

    #[test]
    fn empty_target_list_skips_spawn() {
        // No tool is invoked here; this only exercises the parser's
        // behavior on empty input, which should never occur in practice
        // since `batch_ping` returns early for an empty target list.
        let parsed = parse_batch_output("");
        assert!(parsed.is_empty());
    }
}
