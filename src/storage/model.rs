//! Plain value types for every entity in the data model.
//!
//! These are wire/value types only — no ORM, no query builder. The concrete
//! persistence layer lives outside this crate; `StorageBackend` is the
//! seam it implements against.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Id = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    MikrotikRouter,
    MikrotikSwitch,
    GenericSnmp,
    GenericPing,
    Server,
    AccessPoint,
    Proxmox,
}

impl DeviceType {
    /// True for device types serviced by the RouterOS adapter.
    #[must_use]
    pub fn is_mikrotik(self) -> bool {
        matches!(self, Self::MikrotikRouter | Self::MikrotikSwitch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Warning,
    Offline,
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceData {
    pub identity: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub uptime_seconds: Option<u64>,
    pub cpu_usage_pct: Option<f64>,
    pub memory_usage_pct: Option<f64>,
    pub disk_usage_pct: Option<f64>,
    pub ports: Vec<PortStatus>,
    pub custom_metrics: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortStatus {
    pub name: String,
    pub default_name: Option<String>,
    pub comment: Option<String>,
    pub up: bool,
    /// Resolved in priority order: this cycle's measurement, previous
    /// cycle's cached speed, then unknown.
    pub speed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Id,
    pub name: String,
    pub device_type: DeviceType,
    pub ip_address: Option<String>,
    pub status: DeviceStatus,
    pub credential_profile_id: Option<Id>,
    pub custom_credentials: Option<crate::credentials::DeviceCredentials>,
    pub device_data: DeviceData,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Map {
    pub id: Id,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
    pub id: Id,
    pub map_id: Id,
    pub device_id: Id,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicConnectionType {
    ProxmoxVmHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmEnd {
    Source,
    Target,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DynamicMetadata {
    pub vm_end: Option<VmEnd>,
    pub last_resolved_host_id: Option<Id>,
    pub last_resolved_node_name: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Id,
    pub map_id: Id,
    pub source_device_id: Id,
    pub source_port: Option<String>,
    pub target_device_id: Id,
    pub target_port: Option<String>,
    pub monitor_interface: Option<String>,
    pub is_dynamic: bool,
    pub dynamic_type: Option<DynamicConnectionType>,
    pub dynamic_metadata: Option<DynamicMetadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    Mikrotik,
    Snmp,
    Prometheus,
    Proxmox,
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialProfile {
    pub id: Id,
    pub name: String,
    pub credential_type: CredentialType,
    pub credentials: crate::credentials::DeviceCredentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpamEntryType {
    Cidr,
    Range,
    Single,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpamPool {
    pub id: Id,
    pub name: String,
    pub entry_type: IpamEntryType,
    pub cidr: Option<String>,
    pub range_start: Option<String>,
    pub range_end: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpamAddressStatus {
    Available,
    Assigned,
    Reserved,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpamAddressSource {
    Manual,
    Discovered,
    Sync,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpamAddress {
    pub id: Id,
    pub ip_address: String,
    pub pool_id: Option<Id>,
    pub network_address: Option<String>,
    pub status: IpamAddressStatus,
    pub source: IpamAddressSource,
    pub assigned_device_id: Option<Id>,
    pub assigned_interface_id: Option<Id>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpamAssignment {
    pub id: Id,
    pub address_id: Id,
    pub device_id: Id,
    pub interface_id: Option<Id>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceDiscoverySource {
    Manual,
    Probe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInterface {
    pub id: Id,
    pub device_id: Id,
    pub name: String,
    pub interface_type: String,
    pub oper_status: String,
    pub admin_status: String,
    pub speed: Option<String>,
    pub mac_address: Option<String>,
    pub parent_interface_id: Option<Id>,
    pub discovery_source: InterfaceDiscoverySource,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatusEvent {
    pub id: Id,
    pub device_id: Id,
    pub previous_status: Option<DeviceStatus>,
    pub new_status: DeviceStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxmoxVmType {
    Qemu,
    Lxc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxmoxVmStatus {
    Running,
    Stopped,
    Paused,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxmoxVm {
    pub id: Id,
    pub host_device_id: Id,
    pub vmid: u64,
    pub vm_type: ProxmoxVmType,
    pub name: String,
    pub status: ProxmoxVmStatus,
    pub node: String,
    pub cpu_fraction: Option<f64>,
    pub memory_bytes: Option<u64>,
    pub memory_pct: Option<f64>,
    pub disk_bytes: Option<u64>,
    pub uptime_seconds: Option<u64>,
    pub ip_addresses: Vec<String>,
    pub mac_addresses: Vec<String>,
    pub matched_device_id: Option<Id>,
    pub cluster_name: Option<String>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxmoxNode {
    pub cluster_name: String,
    pub node_name: String,
    pub host_device_id: Id,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingTarget {
    pub id: Id,
    pub device_id: Option<Id>,
    pub ip_address: String,
    pub label: Option<String>,
    pub enabled: bool,
    pub probe_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceMetricRow {
    pub device_id: Id,
    pub timestamp: DateTime<Utc>,
    pub cpu_pct: Option<f64>,
    pub memory_pct: Option<f64>,
    pub disk_pct: Option<f64>,
    pub ping_rtt_ms: Option<f64>,
    pub uptime_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionBandwidthRow {
    pub connection_id: Id,
    pub timestamp: DateTime<Utc>,
    pub in_bytes_per_sec: f64,
    pub out_bytes_per_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusSampleRow {
    pub device_id: Id,
    pub metric_name: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingStats {
    pub sent: u32,
    pub received: u32,
    pub loss_pct: f64,
    pub rtt_min_ms: Option<f64>,
    pub rtt_max_ms: Option<f64>,
    pub rtt_avg_ms: Option<f64>,
    pub rtt_mdev_ms: Option<f64>,
    pub rtt_p10_ms: Option<f64>,
    pub rtt_p25_ms: Option<f64>,
    pub rtt_p50_ms: Option<f64>,
    pub rtt_p75_ms: Option<f64>,
    pub rtt_p90_ms: Option<f64>,
    pub rtt_p95_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingSampleRow {
    pub target_id: Id,
    pub timestamp: DateTime<Utc>,
    pub stats: PingStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Id,
    pub enabled: bool,
    pub url: String,
    pub method: HttpMethod,
    pub message_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSubscription {
    pub id: Id,
    pub device_id: Id,
    pub notification_id: Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DutyShift {
    Day,
    Night,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DutyScheduleEntry {
    pub user_id: Id,
    pub shift: DutyShift,
    /// Wall-clock start/end, minutes since midnight, process timezone.
    pub start_minute: u32,
    pub end_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNotificationChannel {
    pub user_id: Id,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmMute {
    pub id: Id,
    pub user_id: Option<Id>,
    pub expires_at: Option<DateTime<Utc>>,
    pub indefinite: bool,
}

impl AlarmMute {
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.indefinite || self.expires_at.is_some_and(|exp| exp > now)
    }
}
