//! Prometheus text-exposition format parser. We only consume this format
//! here (the server-side `prometheus_client` crate only emits it), so this
//! is a small hand-written reader rather than a dependency.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl SampleType {
    fn parse(s: &str) -> Self {
        match s {
            "counter" => Self::Counter,
            "gauge" => Self::Gauge,
            "histogram" => Self::Histogram,
            "summary" => Self::Summary,
            _ => Self::Untyped,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub metric_name: String,
    pub labels: HashMap<String, String>,
    pub value: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MetricFamily {
    pub help: Option<String>,
    pub sample_type: Option<SampleType>,
    pub samples: Vec<Sample>,
}

/// Parses a full scrape body into per-metric-name families, preserving the
/// `# HELP`/`# TYPE` metadata lines that precede each family's samples.
pub fn parse(body: &str) -> HashMap<String, MetricFamily> {
    let mut families: HashMap<String, MetricFamily> = HashMap::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("# HELP ") {
            if let Some((name, help)) = rest.split_once(' ') {
                families.entry(name.to_string()).or_default().help = Some(help.to_string());
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("# TYPE ") {
            if let Some((name, ty)) = rest.split_once(' ') {
                families.entry(name.to_string()).or_default().sample_type = Some(SampleType::parse(ty));
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let Some(sample) = parse_sample_line(line) else { continue };
        families.entry(sample.metric_name.clone()).or_default().samples.push(sample);
    }

    families
}

fn parse_sample_line(line: &str) -> Option<Sample> {
    let (name_and_labels, value_part) = line.rsplit_once(' ')?;
    let value: f64 = value_part.trim().parse().ok()?;

    if let Some(brace_start) = name_and_labels.find('{') {
        let metric_name = name_and_labels[..brace_start].to_string();
        let label_str = name_and_labels[brace_start + 1..].trim_end_matches('}');
        let labels = parse_labels(label_str);
        Some(Sample { metric_name, labels, value })
    } else {
        Some(Sample { metric_name: name_and_labels.to_string(), labels: HashMap::new(), value })
    }
}

fn parse_labels(raw: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    let mut chars = raw.chars().peekable();
    while chars.peek().is_some() {
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' {
                break;
            }
            key.push(c);
            chars.next();
        }
        chars.next(); // '='
        if chars.peek() != Some(&'"') {
            break;
        }
        chars.next(); // opening quote
        let mut value = String::new();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    value.push(escaped);
                }
                continue;
            }
            if c == '"' {
                break;
            }
            value.push(c);
        }
        labels.insert(key.trim().to_string(), value);
        if chars.peek() == Some(&',') {
            chars.next();
        }
        while chars.peek() == Some(&' ') {
            chars.next();
        }
    }
    labels
}

/// A parsed `{label="value",...}` selector, matched by requiring exact
/// equality of every specified label.
pub fn parse_label_selector(selector: &str) -> HashMap<String, String> {
    let trimmed = selector.trim().trim_start_matches('{').trim_end_matches('}');
    parse_labels(trimmed)
}

#[must_use]
pub fn labels_match(sample_labels: &HashMap<String, String>, selector: &HashMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| sample_labels.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_gauge() {
        let body = "# HELP node_cpu_seconds_total total cpu\n# TYPE node_cpu_seconds_total counter\nnode_cpu_seconds_total{cpu=\"0\",mode=\"idle\"} 12345.6\n";
        let families = parse(body);
        let family = &families["node_cpu_seconds_total"];
        assert_eq!(family.sample_type, Some(SampleType::Counter));
        assert_eq!(family.samples.len(), 1);
        assert_eq!(family.samples[0].labels["cpu"], "0");
        assert_eq!(family.samples[0].value, 12345.6);
    }

    #[test]
    fn parses_sample_without_labels() {
        let body = "node_load1 0.42\n";
        let families = parse(body);
        assert_eq!(families["node_load1"].samples[0].value, 0.42);
    }

    #[test]
    fn label_selector_requires_exact_match() {
        let selector = parse_label_selector("{chip=\"coretemp-isa-0000\",sensor=\"temp1\"}");
        let mut labels = HashMap::new();
        labels.insert("chip".to_string(), "coretemp-isa-0000".to_string());
        labels.insert("sensor".to_string(), "temp1".to_string());
        assert!(labels_match(&labels, &selector));

        labels.insert("sensor".to_string(), "temp2".to_string());
        assert!(!labels_match(&labels, &selector));
    }
}
