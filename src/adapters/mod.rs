//! Protocol adapters: one module per device category, each returning the
//! common [`ProbeResult`].
//!
//! Adapters never touch storage. A worker in [`crate::scheduler`] invokes
//! the adapter matching a device's type, then writes the result back.

pub mod ping;
pub mod prometheus;
pub mod proxmox;
pub mod routeros;
pub mod snmp;

use std::collections::HashMap;

use crate::credentials::DeviceCredentials;
use crate::storage::model::PortStatus;

/// One address observed on a device interface during a probe, handed to
/// [`crate::ipam::Reconciler`].
#[derive(Debug, Clone)]
pub struct InterfaceAddressObservation {
    pub interface_name: String,
    pub ip_address: String,
    pub prefix_len: Option<u8>,
    pub disabled: bool,
    pub comment: Option<String>,
}

/// Normalized probe output shared by every adapter.
#[derive(Debug, Clone, Default)]
pub struct ProbeResult {
    pub success: bool,
    pub identity: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub uptime_seconds: Option<u64>,
    pub cpu_usage_pct: Option<f64>,
    pub memory_usage_pct: Option<f64>,
    pub disk_usage_pct: Option<f64>,
    pub ports: Vec<PortStatus>,
    pub custom_metrics: HashMap<String, f64>,
    pub interface_addresses: Vec<InterfaceAddressObservation>,
    pub error: Option<String>,
}

impl ProbeResult {
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// A raw interface traffic-counter sample, paired with the wall-clock time
/// it was taken.
#[derive(Debug, Clone, Copy)]
pub struct CounterSample {
    pub in_octets: u64,
    pub out_octets: u64,
    pub taken_at: chrono::DateTime<chrono::Utc>,
}

/// Options threaded into an adapter invocation besides the address and
/// credentials: whether this cycle is detailed, and which interface (if
/// any) to sample traffic counters for.
#[derive(Debug, Clone, Default)]
pub struct ProbeOptions {
    pub detailed: bool,
    pub monitor_interface: Option<String>,
    /// Port speeds cached from the previous cycle, consulted when this
    /// cycle doesn't measure a fresh speed.
    pub previous_ports: Vec<PortStatus>,
}

/// Tagged-variant dispatch across the five protocol families. Avoids
/// dynamic dispatch across a class hierarchy.
pub enum Adapter {
    RouterOs { port: u16 },
    Snmp { port: u16 },
    Prometheus { port: u16, path: String, scheme: String },
    Proxmox { port: u16, verify_tls: bool },
    Ping,
}

impl Adapter {
    #[must_use]
    pub fn from_device_type(device_type: crate::storage::model::DeviceType) -> Option<Self> {
        use crate::storage::model::DeviceType as DT;
        match device_type {
            DT::MikrotikRouter | DT::MikrotikSwitch => Some(Self::RouterOs { port: 8728 }),
            DT::GenericSnmp | DT::AccessPoint => Some(Self::Snmp { port: 161 }),
            DT::Server => Some(Self::Snmp { port: 161 }),
            DT::Proxmox => Some(Self::Proxmox { port: 8006, verify_tls: true }),
            DT::GenericPing => Some(Self::Ping),
        }
    }

    /// Same as [`Self::from_device_type`], except `server` devices resolve
    /// to whichever of SNMP/Prometheus the device's actual credentials
    /// carry, since `profile_accepts` allows either for that device type.
    #[must_use]
    pub fn for_device(device_type: crate::storage::model::DeviceType, credentials: Option<&DeviceCredentials>) -> Option<Self> {
        use crate::storage::model::DeviceType as DT;
        if device_type == DT::Server {
            return match credentials {
                Some(DeviceCredentials::Prometheus(creds)) => Some(Self::Prometheus {
                    port: creds.port.unwrap_or(9100),
                    path: creds.scrape_path.clone().unwrap_or_else(|| "/metrics".to_string()),
                    scheme: creds.scheme.clone().unwrap_or_else(|| "http".to_string()),
                }),
                _ => Some(Self::Snmp { port: 161 }),
            };
        }
        Self::from_device_type(device_type)
    }

    pub async fn probe(
        &self,
        ip_address: &str,
        credentials: Option<&DeviceCredentials>,
        options: &ProbeOptions,
    ) -> ProbeResult {
        match self {
            Adapter::RouterOs { port } => {
                let Some(DeviceCredentials::Mikrotik(creds)) = credentials else {
                    return ProbeResult::failure("missing mikrotik credentials");
                };
                routeros::probe(ip_address, creds.port.unwrap_or(*port), creds, options).await
            }
            Adapter::Snmp { port } => {
                let Some(DeviceCredentials::Snmp(creds)) = credentials else {
                    return ProbeResult::failure("missing snmp credentials");
                };
                snmp::probe(ip_address, creds.port.unwrap_or(*port), creds).await
            }
            Adapter::Prometheus { port, path, scheme } => {
                let Some(DeviceCredentials::Prometheus(creds)) = credentials else {
                    return ProbeResult::failure("missing prometheus credentials");
                };
                prometheus::probe(
                    ip_address,
                    creds.port.unwrap_or(*port),
                    creds.scrape_path.as_deref().unwrap_or(path),
                    creds.scheme.as_deref().unwrap_or(scheme),
                    creds,
                    &[],
                )
                .await
            }
            Adapter::Proxmox { port, verify_tls } => {
                let Some(DeviceCredentials::Proxmox(creds)) = credentials else {
                    return ProbeResult::failure("missing proxmox credentials");
                };
                proxmox::probe(ip_address, creds.port.unwrap_or(*port), *verify_tls, creds).await
            }
            Adapter::Ping => ProbeResult::failure("ping devices are serviced by the batch prober"),
        }
    }
}
