//! Independent high-frequency batch pinger (`spec.md` §4.5). Runs on its
//! own cadence, separate from the main device-polling cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::adapters::ping::{self, RawPingSamples};
use crate::error::Result;
use crate::history::Ingestor;
use crate::storage::model::PingStats;
use crate::storage::StorageBackend;

pub struct PingProber {
    storage: Arc<dyn StorageBackend>,
    ingestor: Arc<Ingestor>,
    tool_path: String,
    packet_timeout_ms: u64,
    running: AtomicBool,
}

impl PingProber {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, ingestor: Arc<Ingestor>, tool_path: String, packet_timeout_ms: u64) -> Self {
        Self { storage, ingestor, tool_path, packet_timeout_ms, running: AtomicBool::new(false) }
    }

    /// Runs one batch-ping cycle across every enabled target. Skips the
    /// cycle entirely (logging at `debug`) if the previous one is still
    /// running, matching the Scheduler's own `isProbing` guard.
    pub async fn run_cycle(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("ping cycle skipped, previous cycle still running");
            return Ok(());
        }
        let result = self.run_cycle_inner().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_cycle_inner(&self) -> Result<()> {
        let targets: Vec<_> = self.storage.get_all_ping_targets().await?.into_iter().filter(|t| t.enabled).collect();
        if targets.is_empty() {
            return Ok(());
        }
        let max_probe_count = targets.iter().map(|t| t.probe_count).max().unwrap_or(1);
        let ips: Vec<String> = targets.iter().map(|t| t.ip_address.clone()).collect();

        let samples = match ping::batch_ping(&self.tool_path, &ips, max_probe_count, self.packet_timeout_ms).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "batch ping invocation failed");
                return Ok(());
            }
        };

        for target in &targets {
            let raw = samples.iter().find(|s| s.ip_address == target.ip_address);
            let stats = raw.map_or_else(PingStats::default, |r| compute_stats(r, target.probe_count));
            self.ingestor.record_ping_sample(&target.id, stats).await?;
        }
        Ok(())
    }
}

/// Trims the raw sample vector to the target's own `probe_count` (a single
/// batch invocation may send more packets than a lower-count target asked
/// for) and derives the full stats row.
fn compute_stats(raw: &RawPingSamples, probe_count: u32) -> PingStats {
    let trimmed: Vec<Option<f64>> = raw.rtts_ms.iter().take(probe_count as usize).copied().collect();
    let sent = trimmed.len() as u32;
    let mut received: Vec<f64> = trimmed.into_iter().flatten().collect();
    received.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let received_count = received.len() as u32;
    let loss_pct = if sent == 0 { 0.0 } else { (sent - received_count) as f64 / sent as f64 * 100.0 };

    if received.is_empty() {
        return PingStats { sent, received: 0, loss_pct, ..Default::default() };
    }

    let mean = received.iter().sum::<f64>() / received.len() as f64;
    let variance = received.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / received.len() as f64;
    let mdev = variance.sqrt();

    PingStats {
        sent,
        received: received_count,
        loss_pct,
        rtt_min_ms: received.first().copied(),
        rtt_max_ms: received.last().copied(),
        rtt_avg_ms: Some(mean),
        rtt_mdev_ms: Some(mdev),
        rtt_p10_ms: Some(percentile(&received, 10.0)),
        rtt_p25_ms: Some(percentile(&received, 25.0)),
        rtt_p50_ms: Some(percentile(&received, 50.0)),
        rtt_p75_ms: Some(percentile(&received, 75.0)),
        rtt_p90_ms: Some(percentile(&received, 90.0)),
        rtt_p95_ms: Some(percentile(&received, 95.0)),
    }
}

/// Linear-interpolation percentile over an already-sorted slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_single_sample_is_itself() {
        assert_eq!(percentile(&[5.0], 90.0), 5.0);
    }

    #[test]
    fn median_of_odd_sorted_set_is_middle_value() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 50.0), 3.0);
    }

    #[test]
    fn compute_stats_tracks_loss_and_percentiles() {
        let raw = RawPingSamples {
            ip_address: "10.0.0.1".into(),
            rtts_ms: vec![Some(1.0), None, Some(3.0), Some(2.0)],
        };
        let stats = compute_stats(&raw, 4);
        assert_eq!(stats.sent, 4);
        assert_eq!(stats.received, 3);
        assert!((stats.loss_pct - 25.0).abs() < 0.001);
        assert_eq!(stats.rtt_min_ms, Some(1.0));
        assert_eq!(stats.rtt_max_ms, Some(3.0));
        assert_eq!(stats.rtt_p50_ms, Some(2.0));
    }

    #[test]
    fn zero_received_samples_yields_null_rtt_fields() {
        let raw = RawPingSamples { ip_address: "10.0.0.1".into(), rtts_ms: vec![None, None] };
        let stats = compute_stats(&raw, 2);
        assert_eq!(stats.received, 0);
        assert!((stats.loss_pct - 100.0).abs() < 0.001);
        assert!(stats.rtt_avg_ms.is_none());
    }
}
