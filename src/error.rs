//! Error types for the topology monitor

use thiserror::Error;

/// Data-level errors discovered while normalizing a single probe sample.
///
/// These never abort a probe: the offending sample is discarded and the
/// rest of the probe result is kept.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("counter wraparound on connection {connection_id}: {previous} -> {current}")]
    CounterWraparound {
        connection_id: String,
        previous: u64,
        current: u64,
    },

    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("non-finite metric value for {0}")]
    NonFiniteMetric(String),
}

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network or IO error
    #[error("IO error")]
    Io(#[from] std::io::Error),

    /// A probe's transport layer failed (TCP connect, TLS, HTTP status >= 400,
    /// SNMP timeout, DNS failure)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A probe's response was malformed or missing a required field
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Credentials were rejected by the remote device
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A worker's hard per-device deadline expired
    #[error("Deadline exceeded")]
    Deadline,

    /// A single sample failed validation; the rest of the probe is kept
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Storage backend error, propagated out of a worker and counted as an
    /// error outcome; never crashes the Scheduler
    #[error("Storage error: {0}")]
    Storage(String),

    /// Address parsing error
    #[error("Address parse error")]
    AddrParse(#[from] std::net::AddrParseError),

    /// Outbound HTTP error (Prometheus scrape, Proxmox REST, notification dispatch)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for AppError {
    fn from(error: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Convenient alias for Result with application error
pub type Result<T> = std::result::Result<T, AppError>;
