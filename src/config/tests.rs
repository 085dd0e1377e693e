// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Unit tests for configuration module

#[cfg(test)]
mod test {
    use super::super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.polling_interval_secs, 30);
        assert_eq!(config.concurrency_ceiling, 80);
        assert_eq!(config.probe_deadline_ms, 6_000);
        assert_eq!(config.detailed_cycle_interval, 10);
        assert_eq!(config.ping_interval_secs, 30);
        assert_eq!(config.ping_probe_count, 20);
    }

    #[test]
    fn test_validate_rejects_zero_ceiling() {
        let mut config = Config::default();
        config.concurrency_ceiling = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_probe_count() {
        let mut config = Config::default();
        config.ping_probe_count = 0;
        assert!(config.validate().is_err());
        config.ping_probe_count = 101;
        assert!(config.validate().is_err());
        config.ping_probe_count = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }
}
