//! Prometheus text-exposition scrape adapter for `server` devices with
//! `usePrometheus` enabled. We are the *consumer* of this wire
//! format here; node_exporter/`prometheus_client` are the producers.

mod parser;

use std::collections::HashMap;

use secrecy::ExposeSecret;

use crate::credentials::PrometheusCredentials;

use super::ProbeResult;
use parser::{labels_match, parse_label_selector, MetricFamily};

/// One entry in the operator-configured custom-metric list.
#[derive(Debug, Clone)]
pub struct PrometheusMetricConfig {
    pub metric_name: String,
    pub label_selector: Option<String>,
    pub display_type: DisplayType,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayType {
    Number,
    Bytes,
    Percentage,
    Bar,
    Text,
    Boolean,
    Rate,
    Gauge,
}

async fn scrape(ip_address: &str, port: u16, path: &str, scheme: &str, credentials: &PrometheusCredentials) -> Result<String, String> {
    let url = format!("{scheme}://{ip_address}:{port}{path}");
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .map_err(|e| e.to_string())?;

    let mut request = client.get(&url);
    if let Some(token) = &credentials.bearer_token {
        request = request.bearer_auth(token.expose_secret());
    }
    if let Some((user, pass)) = &credentials.basic_auth {
        request = request.basic_auth(user, Some(pass.expose_secret()));
    }

    let response = request.send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("scrape returned HTTP {}", response.status()));
    }
    response.text().await.map_err(|e| e.to_string())
}

pub async fn probe(
    ip_address: &str,
    port: u16,
    path: &str,
    scheme: &str,
    credentials: &PrometheusCredentials,
    custom_metrics: &[PrometheusMetricConfig],
) -> ProbeResult {
    let body = match scrape(ip_address, port, path, scheme, credentials).await {
        Ok(b) => b,
        Err(e) => return ProbeResult::failure(format!("scrape failed: {e}")),
    };

    let families = parser::parse(&body);

    let cpu_usage_pct = derive_cpu_usage_pct(&families);
    let memory_usage_pct = derive_memory_usage_pct(&families);
    let disk_usage_pct = derive_disk_usage_pct(&families);

    let mut custom_values = HashMap::new();
    for config in custom_metrics {
        if let Some(value) = select_custom_metric(&families, config) {
            custom_values.insert(config.metric_name.clone(), value);
        }
    }

    ProbeResult {
        success: true,
        identity: None,
        model: None,
        version: None,
        uptime_seconds: None,
        cpu_usage_pct,
        memory_usage_pct,
        disk_usage_pct,
        ports: Vec::new(),
        custom_metrics: custom_values,
        interface_addresses: Vec::new(),
        error: None,
    }
}

fn select_custom_metric(
    families: &HashMap<String, MetricFamily>,
    config: &PrometheusMetricConfig,
) -> Option<f64> {
    let family = families.get(&config.metric_name)?;
    let selector = config.label_selector.as_deref().map(parse_label_selector);
    family
        .samples
        .iter()
        .find(|sample| selector.as_ref().is_none_or(|sel| labels_match(&sample.labels, sel)))
        .map(|sample| sample.value)
        .filter(|v| v.is_finite())
}

fn derive_cpu_usage_pct(families: &HashMap<String, MetricFamily>) -> Option<f64> {
    let family = families.get("node_cpu_seconds_total")?;
    let mut per_cpu_idle: HashMap<String, f64> = HashMap::new();
    let mut per_cpu_total: HashMap<String, f64> = HashMap::new();
    for sample in &family.samples {
        let Some(cpu) = sample.labels.get("cpu") else { continue };
        *per_cpu_total.entry(cpu.clone()).or_insert(0.0) += sample.value;
        if sample.labels.get("mode").map(String::as_str) == Some("idle") {
            *per_cpu_idle.entry(cpu.clone()).or_insert(0.0) += sample.value;
        }
    }
    if per_cpu_total.is_empty() {
        return None;
    }
    let mut busy_fractions = Vec::new();
    for (cpu, total) in &per_cpu_total {
        if *total <= 0.0 {
            continue;
        }
        let idle = per_cpu_idle.get(cpu).copied().unwrap_or(0.0);
        busy_fractions.push((1.0 - idle / total).clamp(0.0, 1.0));
    }
    if busy_fractions.is_empty() {
        return None;
    }
    Some(busy_fractions.iter().sum::<f64>() / busy_fractions.len() as f64 * 100.0)
}

fn derive_memory_usage_pct(families: &HashMap<String, MetricFamily>) -> Option<f64> {
    let total = families.get("node_memory_MemTotal_bytes")?.samples.first()?.value;
    let available = families.get("node_memory_MemAvailable_bytes")?.samples.first()?.value;
    if total <= 0.0 {
        return None;
    }
    Some(((total - available) / total * 100.0).round())
}

fn derive_disk_usage_pct(families: &HashMap<String, MetricFamily>) -> Option<f64> {
    let size_family = families.get("node_filesystem_size_bytes")?;
    let avail_family = families.get("node_filesystem_avail_bytes")?;
    let root = size_family
        .samples
        .iter()
        .find(|s| s.labels.get("mountpoint").map(String::as_str) == Some("/"))?;
    let avail = avail_family
        .samples
        .iter()
        .find(|s| s.labels.get("device") == root.labels.get("device"))?;
    if root.value <= 0.0 {
        return None;
    }
    Some(((root.value - avail.value) / root.value * 100.0).round())
}

/// A single metric's catalogue entry for the UI's label-selector pickers.
#[derive(Debug, Clone)]
pub struct MetricCatalogueEntry {
    pub metric_name: String,
    pub help: Option<String>,
    pub sample_type: Option<String>,
    pub sample_label_vectors: Vec<HashMap<String, String>>,
}

/// Runs a scrape and returns the full metric catalogue, capping the number
/// of sample-label vectors reported per metric.
pub async fn discover_metrics(
    ip_address: &str,
    port: u16,
    path: &str,
    scheme: &str,
    credentials: &PrometheusCredentials,
    max_samples_per_metric: usize,
) -> Result<Vec<MetricCatalogueEntry>, String> {
    let body = scrape(ip_address, port, path, scheme, credentials).await?;
    let families = parser::parse(&body);

    let mut out: Vec<MetricCatalogueEntry> = families
        .into_iter()
        .map(|(name, family)| MetricCatalogueEntry {
            metric_name: name,
            help: family.help,
            sample_type: family.sample_type.map(|t| format!("{t:?}").to_lowercase()),
            sample_label_vectors: family
                .samples
                .into_iter()
                .take(max_samples_per_metric)
                .map(|s| s.labels)
                .collect(),
        })
        .collect();
    out.sort_by(|a, b| a.metric_name.cmp(&b.metric_name));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_body() -> String {
        r#"
node_cpu_seconds_total{cpu="0",mode="idle"} 900
node_cpu_seconds_total{cpu="0",mode="user"} 100
node_memory_MemTotal_bytes 8000
node_memory_MemAvailable_bytes 2000
node_hwmon_temp_celsius{chip="coretemp-isa-0000",sensor="temp1"} 45.0
node_hwmon_temp_celsius{chip="coretemp-isa-0000",sensor="temp2"} 52.0
node_hwmon_temp_celsius{chip="other-chip",sensor="temp1"} 38.0
"#
        .to_string()
    }

    #[test]
    fn derives_cpu_and_memory() {
        let families = parser::parse(&sample_body());
        let cpu = derive_cpu_usage_pct(&families).unwrap();
        assert!((cpu - 10.0).abs() < 0.01);
        let mem = derive_memory_usage_pct(&families).unwrap();
        assert_eq!(mem, 75.0);
    }

    #[test]
    fn selects_exactly_one_matching_custom_metric() {
        let families = parser::parse(&sample_body());
        let config = PrometheusMetricConfig {
            metric_name: "node_hwmon_temp_celsius".to_string(),
            label_selector: Some("{chip=\"coretemp-isa-0000\",sensor=\"temp1\"}".to_string()),
            display_type: DisplayType::Gauge,
            unit: Some("C".to_string()),
        };
        assert_eq!(select_custom_metric(&families, &config), Some(45.0));
    }
}
