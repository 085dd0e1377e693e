//! Per-protocol credential shapes and the profile/device category rule.
//!
//! One device only ever carries credentials for the protocol its
//! [`crate::storage::model::DeviceType`] is probed with; `profile_accepts`
//! is the single place that rule is checked so adapters and the config
//! layer don't duplicate it.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::storage::model::{CredentialType, DeviceType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MikrotikCredentials {
    pub username: String,
    pub password: SecretString,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnmpVersion {
    V1,
    V2c,
    V3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnmpAuthProtocol {
    Md5,
    Sha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnmpPrivProtocol {
    Des,
    Aes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpV3Auth {
    pub username: String,
    pub auth_protocol: SnmpAuthProtocol,
    pub auth_password: SecretString,
    pub priv_protocol: SnmpPrivProtocol,
    pub priv_password: SecretString,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpCredentials {
    pub version: SnmpVersion,
    /// Community string for v1/v2c; unused for v3.
    pub community: Option<SecretString>,
    /// authPriv parameters for v3; unused for v1/v2c.
    pub v3: Option<SnmpV3Auth>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusCredentials {
    pub bearer_token: Option<SecretString>,
    pub basic_auth: Option<(String, SecretString)>,
    pub scrape_path: Option<String>,
    pub scheme: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum ProxmoxAuth {
    Token {
        token_id: String,
        token_secret: SecretString,
    },
    Password {
        username: String,
        password: SecretString,
        realm: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxmoxCredentials {
    pub auth: ProxmoxAuth,
    pub port: Option<u16>,
    pub verify_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingCredentials {
    pub probe_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "credential_type", rename_all = "snake_case")]
pub enum DeviceCredentials {
    Mikrotik(MikrotikCredentials),
    Snmp(SnmpCredentials),
    Prometheus(PrometheusCredentials),
    Proxmox(ProxmoxCredentials),
    Ping(PingCredentials),
}

impl DeviceCredentials {
    #[must_use]
    pub fn credential_type(&self) -> CredentialType {
        match self {
            Self::Mikrotik(_) => CredentialType::Mikrotik,
            Self::Snmp(_) => CredentialType::Snmp,
            Self::Prometheus(_) => CredentialType::Prometheus,
            Self::Proxmox(_) => CredentialType::Proxmox,
            Self::Ping(_) => CredentialType::Ping,
        }
    }
}

/// True if a credential profile of `credential_type` may be attached to a
/// device of `device_type`. Mikrotik routers and switches both take
/// Mikrotik credentials; every other device type maps to exactly one
/// credential type of the same name.
#[must_use]
pub fn profile_accepts(device_type: DeviceType, credential_type: CredentialType) -> bool {
    match device_type {
        DeviceType::MikrotikRouter | DeviceType::MikrotikSwitch => {
            credential_type == CredentialType::Mikrotik
        }
        DeviceType::GenericSnmp => credential_type == CredentialType::Snmp,
        DeviceType::GenericPing => credential_type == CredentialType::Ping,
        DeviceType::Server => {
            matches!(credential_type, CredentialType::Snmp | CredentialType::Prometheus)
        }
        DeviceType::AccessPoint => credential_type == CredentialType::Snmp,
        DeviceType::Proxmox => credential_type == CredentialType::Proxmox,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mikrotik_profile_rejects_snmp() {
        assert!(profile_accepts(DeviceType::MikrotikRouter, CredentialType::Mikrotik));
        assert!(!profile_accepts(DeviceType::MikrotikRouter, CredentialType::Snmp));
    }

    #[test]
    fn server_accepts_snmp_or_prometheus() {
        assert!(profile_accepts(DeviceType::Server, CredentialType::Snmp));
        assert!(profile_accepts(DeviceType::Server, CredentialType::Prometheus));
        assert!(!profile_accepts(DeviceType::Server, CredentialType::Mikrotik));
    }

    #[test]
    fn proxmox_profile_only_on_proxmox_devices() {
        assert!(profile_accepts(DeviceType::Proxmox, CredentialType::Proxmox));
        assert!(!profile_accepts(DeviceType::GenericPing, CredentialType::Proxmox));
    }
}
