//! Time-series ingestion and retention sweeps for the four history tables
//! plus the device-status-event log.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::adapters::ProbeResult;
use crate::config::RetentionHorizons;
use crate::error::Result;
use crate::storage::model::{ConnectionBandwidthRow, DeviceMetricRow, PingSampleRow, PingStats, PrometheusSampleRow};
use crate::storage::StorageBackend;

/// Counter deltas smaller than this are treated as jitter rather than
/// traffic, avoiding a storm of near-zero bandwidth rows on idle links.
const COUNTER_EPSILON: u64 = 0;

pub struct Ingestor {
    storage: Arc<dyn StorageBackend>,
}

impl Ingestor {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Records one device-metric row from a completed probe cycle. No-op
    /// when the probe failed, when every metric field is null (nothing
    /// meaningful to chart), or when a carried float is non-finite.
    pub async fn record_device_metrics(&self, device_id: &str, result: &ProbeResult, ping_rtt_ms: Option<f64>) -> Result<()> {
        if !result.success {
            return Ok(());
        }
        let cpu_pct = finite_or_drop(device_id, "cpu_pct", result.cpu_usage_pct);
        let memory_pct = finite_or_drop(device_id, "memory_pct", result.memory_usage_pct);
        let disk_pct = finite_or_drop(device_id, "disk_pct", result.disk_usage_pct);
        let ping_rtt_ms = finite_or_drop(device_id, "ping_rtt_ms", ping_rtt_ms);

        if cpu_pct.is_none() && memory_pct.is_none() && disk_pct.is_none() && ping_rtt_ms.is_none() && result.uptime_seconds.is_none() {
            return Ok(());
        }

        self.storage
            .insert_device_metric(DeviceMetricRow {
                device_id: device_id.to_string(),
                timestamp: Utc::now(),
                cpu_pct,
                memory_pct,
                disk_pct,
                ping_rtt_ms,
                uptime_seconds: result.uptime_seconds,
            })
            .await
    }

    /// Stores one row per sample, silently dropping any non-finite value
    /// (a scrape target reporting `NaN`/`inf` for a gauge).
    pub async fn record_prometheus_samples(&self, device_id: &str, samples: &[(String, f64)]) -> Result<()> {
        let now = Utc::now();
        for (metric_name, value) in samples {
            if finite_or_drop(device_id, metric_name, Some(*value)).is_none() {
                continue;
            }
            self.storage
                .insert_prometheus_sample(PrometheusSampleRow {
                    device_id: device_id.to_string(),
                    metric_name: metric_name.clone(),
                    timestamp: now,
                    value: *value,
                })
                .await?;
        }
        Ok(())
    }

    pub async fn record_ping_sample(&self, target_id: &str, stats: PingStats) -> Result<()> {
        self.storage
            .insert_ping_sample(PingSampleRow { target_id: target_id.to_string(), timestamp: Utc::now(), stats })
            .await
    }

    /// Computes a bandwidth sample from the raw counter pair against the
    /// last reading recorded for this connection, then stores both the
    /// bandwidth row and the new counter baseline. Skips emitting a row on
    /// the first sample (no prior baseline) or when a counter decreased by
    /// more than [`COUNTER_EPSILON`], which signals a 32-bit wraparound or
    /// a device reboot rather than negative traffic.
    pub async fn record_connection_counters(
        &self,
        connection_id: &str,
        in_bytes: u64,
        out_bytes: u64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let previous = self.storage.get_last_connection_counters(connection_id).await?;
        self.storage.set_last_connection_counters(connection_id, in_bytes, out_bytes, at).await?;

        let Some((prev_in, prev_out, prev_at)) = previous else { return Ok(()) };
        let elapsed = (at - prev_at).num_milliseconds();
        if elapsed <= 0 {
            return Ok(());
        }
        let elapsed_secs = elapsed as f64 / 1000.0;

        let Some(in_delta) = counter_delta(prev_in, in_bytes) else { return Ok(()) };
        let Some(out_delta) = counter_delta(prev_out, out_bytes) else { return Ok(()) };

        self.storage
            .insert_connection_bandwidth(ConnectionBandwidthRow {
                connection_id: connection_id.to_string(),
                timestamp: at,
                in_bytes_per_sec: in_delta as f64 / elapsed_secs,
                out_bytes_per_sec: out_delta as f64 / elapsed_secs,
            })
            .await
    }

    /// Prunes every history table and the status-event log against its
    /// configured retention horizon, logging how many rows each sweep
    /// dropped.
    pub async fn run_retention_sweep(&self, retention: &RetentionHorizons) -> Result<()> {
        let now = Utc::now();
        let sweeps: [(&str, i64); 4] = [
            ("device_metrics", retention.device_metrics_hours),
            ("connection_bandwidth", retention.connection_bandwidth_hours),
            ("prometheus_samples", retention.prometheus_samples_hours),
            ("ping_samples", retention.ping_samples_hours),
        ];
        for (table, hours) in sweeps {
            let cutoff = now - chrono::Duration::hours(hours);
            let dropped = self.storage.prune_history_older_than(table, cutoff).await?;
            if dropped > 0 {
                tracing::debug!(table, dropped, "retention sweep pruned rows");
            }
        }

        let status_cutoff = now - chrono::Duration::hours(retention.status_events_hours);
        let dropped = self.storage.prune_status_events_older_than(status_cutoff).await?;
        if dropped > 0 {
            tracing::debug!(dropped, "retention sweep pruned status events");
        }
        Ok(())
    }
}

/// Passes `value` through unchanged when finite; when it's `NaN`/`inf`,
/// logs a [`crate::error::DataError::NonFiniteMetric`] and drops it so the
/// rest of the row (or scrape) is still recorded.
fn finite_or_drop(device_id: &str, field: &str, value: Option<f64>) -> Option<f64> {
    let v = value?;
    if v.is_finite() {
        return Some(v);
    }
    let err = crate::error::DataError::NonFiniteMetric(field.to_string());
    tracing::warn!(device_id, field, value = v, error = %err, "dropping non-finite metric value");
    None
}

/// `None` when `current < previous` by more than [`COUNTER_EPSILON`],
/// signaling a wraparound/reboot the caller should not chart as traffic.
fn counter_delta(previous: u64, current: u64) -> Option<u64> {
    if current >= previous {
        Some(current - previous)
    } else if previous - current <= COUNTER_EPSILON {
        Some(0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStorage;
    use chrono::Duration;

    #[tokio::test]
    async fn first_sample_records_no_bandwidth_row() {
        let storage = Arc::new(InMemoryStorage::new());
        let ingestor = Ingestor::new(storage.clone());
        ingestor.record_connection_counters("c1", 1000, 2000, Utc::now()).await.unwrap();
        assert!(storage.get_last_connection_counters("c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_sample_computes_rate_from_delta() {
        let storage = Arc::new(InMemoryStorage::new());
        let ingestor = Ingestor::new(storage.clone());
        let t0 = Utc::now();
        ingestor.record_connection_counters("c1", 1_000, 2_000, t0).await.unwrap();
        ingestor.record_connection_counters("c1", 11_000, 22_000, t0 + Duration::seconds(10)).await.unwrap();

        let (in_bytes, out_bytes, _) = storage.get_last_connection_counters("c1").await.unwrap().unwrap();
        assert_eq!(in_bytes, 11_000);
        assert_eq!(out_bytes, 22_000);
    }

    #[tokio::test]
    async fn counter_wraparound_is_not_charted_as_negative_traffic() {
        let storage = Arc::new(InMemoryStorage::new());
        let ingestor = Ingestor::new(storage.clone());
        let t0 = Utc::now();
        ingestor.record_connection_counters("c1", u64::from(u32::MAX) - 100, 5_000, t0).await.unwrap();
        // Counter reset to near zero: treat as a reboot, not -4 billion bytes/sec.
        ingestor.record_connection_counters("c1", 50, 5_050, t0 + Duration::seconds(5)).await.unwrap();
        let (in_bytes, _, _) = storage.get_last_connection_counters("c1").await.unwrap().unwrap();
        assert_eq!(in_bytes, 50);
    }

    #[tokio::test]
    async fn retention_sweep_prunes_old_rows() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .insert_device_metric(DeviceMetricRow {
                device_id: "d1".into(),
                timestamp: Utc::now() - Duration::hours(48),
                cpu_pct: None,
                memory_pct: None,
                disk_pct: None,
                ping_rtt_ms: None,
                uptime_seconds: None,
            })
            .await
            .unwrap();
        let ingestor = Ingestor::new(storage.clone());
        let retention = RetentionHorizons {
            device_metrics_hours: 24,
            connection_bandwidth_hours: 24,
            prometheus_samples_hours: 24,
            ping_samples_hours: 24,
            status_events_hours: 24,
        };
        ingestor.run_retention_sweep(&retention).await.unwrap();
        let dropped = storage.prune_history_older_than("device_metrics", Utc::now()).await.unwrap();
        assert_eq!(dropped, 0);
    }

    #[tokio::test]
    async fn all_null_device_metrics_row_is_dropped() {
        let storage = Arc::new(InMemoryStorage::new());
        let ingestor = Ingestor::new(storage.clone());
        let result = crate::adapters::ProbeResult { success: true, ..Default::default() };
        ingestor.record_device_metrics("d1", &result, None).await.unwrap();
        let dropped = storage.prune_history_older_than("device_metrics", Utc::now() + Duration::hours(1)).await.unwrap();
        assert_eq!(dropped, 0, "a row with every metric field null should never be stored");
    }

    #[tokio::test]
    async fn non_finite_device_metric_field_is_dropped_but_row_survives() {
        let storage = Arc::new(InMemoryStorage::new());
        let ingestor = Ingestor::new(storage.clone());
        let result = crate::adapters::ProbeResult { success: true, cpu_usage_pct: Some(f64::NAN), memory_usage_pct: Some(42.0), ..Default::default() };
        ingestor.record_device_metrics("d1", &result, None).await.unwrap();
        let dropped = storage.prune_history_older_than("device_metrics", Utc::now() + Duration::hours(1)).await.unwrap();
        assert_eq!(dropped, 1, "row still has a finite field so it should be recorded, just without the NaN");
    }

    #[tokio::test]
    async fn non_finite_prometheus_sample_is_not_inserted() {
        let storage = Arc::new(InMemoryStorage::new());
        let ingestor = Ingestor::new(storage.clone());
        ingestor
            .record_prometheus_samples("d1", &[("good".to_string(), 1.0), ("bad".to_string(), f64::INFINITY)])
            .await
            .unwrap();
        let dropped = storage.prune_history_older_than("prometheus_samples", Utc::now() + Duration::hours(1)).await.unwrap();
        assert_eq!(dropped, 1, "only the finite sample should have been recorded");
    }
}
