// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Process-level tunables for the monitoring core.
//!
//! Loads and parses configuration from environment variables, following the
//! parse-or-default-and-warn discipline: a malformed value never aborts
//! startup, it falls back to the documented default and logs a warning.

#[cfg(test)]
mod tests;

/// Default configuration values.
pub mod defaults {
    pub const POLLING_INTERVAL_SECS: u64 = 30;
    pub const CONCURRENCY_CEILING: usize = 80;
    pub const PROBE_DEADLINE_MS: u64 = 6_000;
    pub const DETAILED_CYCLE_INTERVAL: u64 = 10;
    pub const PING_INTERVAL_SECS: u64 = 30;
    pub const PING_PROBE_COUNT: u32 = 20;
    pub const PING_PACKET_TIMEOUT_MS: u64 = 1_000;
    pub const RETENTION_HOURS: i64 = 24 * 14;
}

/// Environment variable names used by the application.
pub mod env_vars {
    pub const POLLING_INTERVAL_SECS: &str = "POLLING_INTERVAL_SECS";
    pub const CONCURRENCY_CEILING: &str = "CONCURRENCY_CEILING";
    pub const PROBE_DEADLINE_MS: &str = "PROBE_DEADLINE_MS";
    pub const DETAILED_CYCLE_INTERVAL: &str = "DETAILED_CYCLE_INTERVAL";
    pub const PING_INTERVAL_SECS: &str = "PING_INTERVAL_SECS";
    pub const PING_PROBE_COUNT: &str = "PING_PROBE_COUNT";
    pub const PING_PACKET_TIMEOUT_MS: &str = "PING_PACKET_TIMEOUT_MS";
    pub const PING_TOOL_PATH: &str = "PING_TOOL_PATH";
}

/// Per-history-table retention horizons, in hours.
#[derive(Debug, Clone, Copy)]
pub struct RetentionHorizons {
    pub device_metrics_hours: i64,
    pub connection_bandwidth_hours: i64,
    pub prometheus_samples_hours: i64,
    pub ping_samples_hours: i64,
    pub status_events_hours: i64,
}

impl Default for RetentionHorizons {
    fn default() -> Self {
        Self {
            device_metrics_hours: defaults::RETENTION_HOURS,
            connection_bandwidth_hours: defaults::RETENTION_HOURS,
            prometheus_samples_hours: defaults::RETENTION_HOURS,
            ping_samples_hours: defaults::RETENTION_HOURS,
            status_events_hours: defaults::RETENTION_HOURS * 4,
        }
    }
}

/// Application-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub polling_interval_secs: u64,
    pub concurrency_ceiling: usize,
    pub probe_deadline_ms: u64,
    pub detailed_cycle_interval: u64,
    pub ping_interval_secs: u64,
    pub ping_probe_count: u32,
    pub ping_packet_timeout_ms: u64,
    pub ping_tool_path: String,
    pub retention: RetentionHorizons,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            polling_interval_secs: defaults::POLLING_INTERVAL_SECS,
            concurrency_ceiling: defaults::CONCURRENCY_CEILING,
            probe_deadline_ms: defaults::PROBE_DEADLINE_MS,
            detailed_cycle_interval: defaults::DETAILED_CYCLE_INTERVAL,
            ping_interval_secs: defaults::PING_INTERVAL_SECS,
            ping_probe_count: defaults::PING_PROBE_COUNT,
            ping_packet_timeout_ms: defaults::PING_PACKET_TIMEOUT_MS,
            ping_tool_path: "fping".to_string(),
            retention: RetentionHorizons::default(),
        }
    }
}

fn parse_env_or_default<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Failed to parse {name}={raw:?}, using default");
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Expects `dotenvy::dotenv()` to have been called by the application
    /// entry point.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Config {
            polling_interval_secs: parse_env_or_default(
                env_vars::POLLING_INTERVAL_SECS,
                defaults.polling_interval_secs,
            ),
            concurrency_ceiling: parse_env_or_default(
                env_vars::CONCURRENCY_CEILING,
                defaults.concurrency_ceiling,
            ),
            probe_deadline_ms: parse_env_or_default(
                env_vars::PROBE_DEADLINE_MS,
                defaults.probe_deadline_ms,
            ),
            detailed_cycle_interval: parse_env_or_default(
                env_vars::DETAILED_CYCLE_INTERVAL,
                defaults.detailed_cycle_interval,
            ),
            ping_interval_secs: parse_env_or_default(
                env_vars::PING_INTERVAL_SECS,
                defaults.ping_interval_secs,
            ),
            ping_probe_count: parse_env_or_default(
                env_vars::PING_PROBE_COUNT,
                defaults.ping_probe_count,
            ),
            ping_packet_timeout_ms: parse_env_or_default(
                env_vars::PING_PACKET_TIMEOUT_MS,
                defaults.ping_packet_timeout_ms,
            ),
            ping_tool_path: std::env::var(env_vars::PING_TOOL_PATH)
                .unwrap_or(defaults.ping_tool_path),
            retention: RetentionHorizons::default(),
        };

        if let Err(e) = config.validate() {
            tracing::error!("Invalid configuration: {e}. Falling back to defaults for affected values.");
        }

        config
    }

    /// Validates cross-field invariants; individual scalar parses already
    /// fall back to defaults, so this only catches values that parsed fine
    /// but are out of range.
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency_ceiling == 0 {
            return Err("concurrency ceiling must be at least 1".to_string());
        }
        if self.probe_deadline_ms == 0 {
            return Err("probe deadline must be greater than zero".to_string());
        }
        if self.detailed_cycle_interval == 0 {
            return Err("detailed cycle interval must be at least 1".to_string());
        }
        if !(1..=100).contains(&self.ping_probe_count) {
            return Err("ping probe count must be in [1, 100]".to_string());
        }
        Ok(())
    }
}
