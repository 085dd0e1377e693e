//! Pluggable persistence seam.
//!
//! No SQL dialect is prescribed; the Scheduler, adapters, and engines all
//! talk to storage only through [`StorageBackend`]. [`memory::InMemoryStorage`]
//! is a reference implementation used by tests and can stand in for a real
//! backend in a single-process deployment.

pub mod memory;
pub mod model;

use async_trait::async_trait;

use crate::error::Result;
use model::*;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    // -- Devices --
    async fn get_all_devices(&self) -> Result<Vec<Device>>;
    async fn get_device(&self, id: &str) -> Result<Option<Device>>;
    /// Looks a device up by its primary `ip_address` or any address
    /// recorded against it in the IPAM table.
    async fn get_device_by_any_ip(&self, ip: &str) -> Result<Option<Device>>;
    async fn upsert_device(&self, device: Device) -> Result<()>;
    async fn delete_device(&self, id: &str) -> Result<()>;

    // -- Maps / placements --
    async fn get_all_maps(&self) -> Result<Vec<Map>>;
    async fn get_placements_for_map(&self, map_id: &str) -> Result<Vec<Placement>>;

    // -- Connections --
    async fn get_all_connections(&self) -> Result<Vec<Connection>>;
    async fn get_connections_for_map(&self, map_id: &str) -> Result<Vec<Connection>>;
    async fn upsert_connection(&self, connection: Connection) -> Result<()>;

    // -- Credential profiles --
    async fn get_all_credential_profiles(&self) -> Result<Vec<CredentialProfile>>;
    async fn get_credential_profile(&self, id: &str) -> Result<Option<CredentialProfile>>;

    // -- IPAM --
    async fn get_all_ipam_pools(&self) -> Result<Vec<IpamPool>>;
    async fn get_all_ipam_addresses(&self) -> Result<Vec<IpamAddress>>;
    async fn get_ipam_address(&self, ip: &str) -> Result<Option<IpamAddress>>;
    async fn upsert_ipam_address(&self, address: IpamAddress) -> Result<()>;
    async fn upsert_ipam_assignment(&self, assignment: IpamAssignment) -> Result<()>;

    // -- Device interfaces --
    async fn get_interfaces_for_device(&self, device_id: &str) -> Result<Vec<DeviceInterface>>;
    async fn upsert_device_interface(&self, iface: DeviceInterface) -> Result<()>;
    async fn delete_device_interface(&self, id: &str) -> Result<()>;

    // -- Device status events --
    async fn append_device_status_event(&self, event: DeviceStatusEvent) -> Result<()>;
    async fn get_latest_status_event(&self, device_id: &str) -> Result<Option<DeviceStatusEvent>>;
    async fn prune_status_events_older_than(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64>;

    // -- Proxmox --
    async fn get_all_proxmox_vms(&self) -> Result<Vec<ProxmoxVm>>;
    async fn get_proxmox_vms_for_host(&self, host_device_id: &str) -> Result<Vec<ProxmoxVm>>;
    async fn upsert_proxmox_vm(&self, vm: ProxmoxVm) -> Result<()>;
    async fn delete_proxmox_vm(&self, id: &str) -> Result<()>;
    async fn get_all_proxmox_nodes(&self) -> Result<Vec<ProxmoxNode>>;
    async fn upsert_proxmox_node(&self, node: ProxmoxNode) -> Result<()>;

    // -- Ping targets --
    async fn get_all_ping_targets(&self) -> Result<Vec<PingTarget>>;

    // -- History --
    async fn insert_device_metric(&self, row: DeviceMetricRow) -> Result<()>;
    async fn insert_connection_bandwidth(&self, row: ConnectionBandwidthRow) -> Result<()>;
    async fn insert_prometheus_sample(&self, row: PrometheusSampleRow) -> Result<()>;
    async fn insert_ping_sample(&self, row: PingSampleRow) -> Result<()>;
    async fn prune_history_older_than(&self, table: &str, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64>;

    /// Last counter reading recorded for a connection, used to compute the
    /// delta for the next sample.
    async fn get_last_connection_counters(&self, connection_id: &str) -> Result<Option<(u64, u64, chrono::DateTime<chrono::Utc>)>>;
    async fn set_last_connection_counters(&self, connection_id: &str, in_bytes: u64, out_bytes: u64, at: chrono::DateTime<chrono::Utc>) -> Result<()>;

    // -- Notifications --
    async fn get_all_notifications(&self) -> Result<Vec<Notification>>;
    async fn get_subscriptions_for_device(&self, device_id: &str) -> Result<Vec<NotificationSubscription>>;

    // -- Duty roster / mutes --
    async fn get_duty_schedule(&self) -> Result<Vec<DutyScheduleEntry>>;
    async fn get_user_channels(&self) -> Result<Vec<UserNotificationChannel>>;
    async fn get_active_mutes(&self) -> Result<Vec<AlarmMute>>;

    // -- Settings --
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;
    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;
}
