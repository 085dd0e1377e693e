//! In-process reference implementation of [`StorageBackend`], used by tests
//! and by deployments small enough to skip a real database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::storage::model::*;
use crate::storage::StorageBackend;

#[derive(Default)]
struct State {
    devices: HashMap<String, Device>,
    maps: HashMap<String, Map>,
    placements: HashMap<String, Placement>,
    connections: HashMap<String, Connection>,
    credential_profiles: HashMap<String, CredentialProfile>,
    ipam_pools: HashMap<String, IpamPool>,
    ipam_addresses: HashMap<String, IpamAddress>,
    ipam_assignments: HashMap<String, IpamAssignment>,
    device_interfaces: HashMap<String, DeviceInterface>,
    status_events: Vec<DeviceStatusEvent>,
    proxmox_vms: HashMap<String, ProxmoxVm>,
    proxmox_nodes: HashMap<(String, String), ProxmoxNode>,
    ping_targets: HashMap<String, PingTarget>,
    device_metrics: Vec<DeviceMetricRow>,
    connection_bandwidth: Vec<ConnectionBandwidthRow>,
    prometheus_samples: Vec<PrometheusSampleRow>,
    ping_samples: Vec<PingSampleRow>,
    last_connection_counters: HashMap<String, (u64, u64, DateTime<Utc>)>,
    notifications: HashMap<String, Notification>,
    subscriptions: Vec<NotificationSubscription>,
    duty_schedule: Vec<DutyScheduleEntry>,
    user_channels: Vec<UserNotificationChannel>,
    mutes: Vec<AlarmMute>,
    settings: HashMap<String, String>,
}

/// Guarded by a single mutex; fine for tests and small deployments, not a
/// design meant to scale past one process.
#[derive(Default)]
pub struct InMemoryStorage {
    state: Mutex<State>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Seeds an IPAM pool. Pool CRUD is an external REST concern (see
    /// `spec.md` §6); this reference backend only needs to let tests set
    /// pools up without a real API layer in front of it.
    pub async fn seed_ipam_pool(&self, pool: IpamPool) {
        self.lock().ipam_pools.insert(pool.id.clone(), pool);
    }

    /// Seeds a credential profile for tests, same rationale as
    /// [`Self::seed_ipam_pool`].
    pub async fn seed_credential_profile(&self, profile: CredentialProfile) {
        self.lock().credential_profiles.insert(profile.id.clone(), profile);
    }

    /// Seeds a notification definition, same rationale as
    /// [`Self::seed_ipam_pool`].
    pub async fn seed_notification(&self, notification: Notification) {
        self.lock().notifications.insert(notification.id.clone(), notification);
    }

    pub async fn seed_subscription(&self, subscription: NotificationSubscription) {
        self.lock().subscriptions.push(subscription);
    }

    pub async fn seed_duty_schedule_entry(&self, entry: DutyScheduleEntry) {
        self.lock().duty_schedule.push(entry);
    }

    pub async fn seed_user_channel(&self, channel: UserNotificationChannel) {
        self.lock().user_channels.push(channel);
    }

    pub async fn seed_alarm_mute(&self, mute: AlarmMute) {
        self.lock().mutes.push(mute);
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn get_all_devices(&self) -> Result<Vec<Device>> {
        Ok(self.lock().devices.values().cloned().collect())
    }

    async fn get_device(&self, id: &str) -> Result<Option<Device>> {
        Ok(self.lock().devices.get(id).cloned())
    }

    async fn get_device_by_any_ip(&self, ip: &str) -> Result<Option<Device>> {
        let state = self.lock();
        if let Some(device) = state
            .devices
            .values()
            .find(|d| d.ip_address.as_deref() == Some(ip))
        {
            return Ok(Some(device.clone()));
        }
        if let Some(addr) = state.ipam_addresses.values().find(|a| a.ip_address == ip) {
            if let Some(device_id) = &addr.assigned_device_id {
                return Ok(state.devices.get(device_id).cloned());
            }
        }
        Ok(None)
    }

    async fn upsert_device(&self, device: Device) -> Result<()> {
        self.lock().devices.insert(device.id.clone(), device);
        Ok(())
    }

    async fn delete_device(&self, id: &str) -> Result<()> {
        self.lock().devices.remove(id);
        Ok(())
    }

    async fn get_all_maps(&self) -> Result<Vec<Map>> {
        Ok(self.lock().maps.values().cloned().collect())
    }

    async fn get_placements_for_map(&self, map_id: &str) -> Result<Vec<Placement>> {
        Ok(self
            .lock()
            .placements
            .values()
            .filter(|p| p.map_id == map_id)
            .cloned()
            .collect())
    }

    async fn get_all_connections(&self) -> Result<Vec<Connection>> {
        Ok(self.lock().connections.values().cloned().collect())
    }

    async fn get_connections_for_map(&self, map_id: &str) -> Result<Vec<Connection>> {
        Ok(self
            .lock()
            .connections
            .values()
            .filter(|c| c.map_id == map_id)
            .cloned()
            .collect())
    }

    async fn upsert_connection(&self, connection: Connection) -> Result<()> {
        self.lock().connections.insert(connection.id.clone(), connection);
        Ok(())
    }

    async fn get_all_credential_profiles(&self) -> Result<Vec<CredentialProfile>> {
        Ok(self.lock().credential_profiles.values().cloned().collect())
    }

    async fn get_credential_profile(&self, id: &str) -> Result<Option<CredentialProfile>> {
        Ok(self.lock().credential_profiles.get(id).cloned())
    }

    async fn get_all_ipam_pools(&self) -> Result<Vec<IpamPool>> {
        Ok(self.lock().ipam_pools.values().cloned().collect())
    }

    async fn get_all_ipam_addresses(&self) -> Result<Vec<IpamAddress>> {
        Ok(self.lock().ipam_addresses.values().cloned().collect())
    }

    async fn get_ipam_address(&self, ip: &str) -> Result<Option<IpamAddress>> {
        Ok(self
            .lock()
            .ipam_addresses
            .values()
            .find(|a| a.ip_address == ip)
            .cloned())
    }

    async fn upsert_ipam_address(&self, address: IpamAddress) -> Result<()> {
        self.lock().ipam_addresses.insert(address.id.clone(), address);
        Ok(())
    }

    async fn upsert_ipam_assignment(&self, assignment: IpamAssignment) -> Result<()> {
        self.lock().ipam_assignments.insert(assignment.id.clone(), assignment);
        Ok(())
    }

    async fn get_interfaces_for_device(&self, device_id: &str) -> Result<Vec<DeviceInterface>> {
        Ok(self
            .lock()
            .device_interfaces
            .values()
            .filter(|i| i.device_id == device_id)
            .cloned()
            .collect())
    }

    async fn upsert_device_interface(&self, iface: DeviceInterface) -> Result<()> {
        self.lock().device_interfaces.insert(iface.id.clone(), iface);
        Ok(())
    }

    async fn delete_device_interface(&self, id: &str) -> Result<()> {
        self.lock().device_interfaces.remove(id);
        Ok(())
    }

    async fn append_device_status_event(&self, event: DeviceStatusEvent) -> Result<()> {
        self.lock().status_events.push(event);
        Ok(())
    }

    async fn get_latest_status_event(&self, device_id: &str) -> Result<Option<DeviceStatusEvent>> {
        Ok(self
            .lock()
            .status_events
            .iter()
            .rev()
            .find(|e| e.device_id == device_id)
            .cloned())
    }

    async fn prune_status_events_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.lock();
        let before = state.status_events.len();
        state.status_events.retain(|e| e.created_at >= cutoff);
        Ok((before - state.status_events.len()) as u64)
    }

    async fn get_all_proxmox_vms(&self) -> Result<Vec<ProxmoxVm>> {
        Ok(self.lock().proxmox_vms.values().cloned().collect())
    }

    async fn get_proxmox_vms_for_host(&self, host_device_id: &str) -> Result<Vec<ProxmoxVm>> {
        Ok(self
            .lock()
            .proxmox_vms
            .values()
            .filter(|v| v.host_device_id == host_device_id)
            .cloned()
            .collect())
    }

    async fn upsert_proxmox_vm(&self, vm: ProxmoxVm) -> Result<()> {
        self.lock().proxmox_vms.insert(vm.id.clone(), vm);
        Ok(())
    }

    async fn delete_proxmox_vm(&self, id: &str) -> Result<()> {
        self.lock().proxmox_vms.remove(id);
        Ok(())
    }

    async fn get_all_proxmox_nodes(&self) -> Result<Vec<ProxmoxNode>> {
        Ok(self.lock().proxmox_nodes.values().cloned().collect())
    }

    async fn upsert_proxmox_node(&self, node: ProxmoxNode) -> Result<()> {
        let key = (node.cluster_name.clone(), node.node_name.clone());
        self.lock().proxmox_nodes.insert(key, node);
        Ok(())
    }

    async fn get_all_ping_targets(&self) -> Result<Vec<PingTarget>> {
        Ok(self.lock().ping_targets.values().cloned().collect())
    }

    async fn insert_device_metric(&self, row: DeviceMetricRow) -> Result<()> {
        self.lock().device_metrics.push(row);
        Ok(())
    }

    async fn insert_connection_bandwidth(&self, row: ConnectionBandwidthRow) -> Result<()> {
        self.lock().connection_bandwidth.push(row);
        Ok(())
    }

    async fn insert_prometheus_sample(&self, row: PrometheusSampleRow) -> Result<()> {
        self.lock().prometheus_samples.push(row);
        Ok(())
    }

    async fn insert_ping_sample(&self, row: PingSampleRow) -> Result<()> {
        self.lock().ping_samples.push(row);
        Ok(())
    }

    async fn prune_history_older_than(&self, table: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.lock();
        let before = match table {
            "device_metrics" => state.device_metrics.len(),
            "connection_bandwidth" => state.connection_bandwidth.len(),
            "prometheus_samples" => state.prometheus_samples.len(),
            "ping_samples" => state.ping_samples.len(),
            _ => return Ok(0),
        };
        match table {
            "device_metrics" => state.device_metrics.retain(|r| r.timestamp >= cutoff),
            "connection_bandwidth" => state.connection_bandwidth.retain(|r| r.timestamp >= cutoff),
            "prometheus_samples" => state.prometheus_samples.retain(|r| r.timestamp >= cutoff),
            "ping_samples" => state.ping_samples.retain(|r| r.timestamp >= cutoff),
            _ => unreachable!(),
        }
        let after = match table {
            "device_metrics" => state.device_metrics.len(),
            "connection_bandwidth" => state.connection_bandwidth.len(),
            "prometheus_samples" => state.prometheus_samples.len(),
            "ping_samples" => state.ping_samples.len(),
            _ => unreachable!(),
        };
        Ok((before - after) as u64)
    }

    async fn get_last_connection_counters(
        &self,
        connection_id: &str,
    ) -> Result<Option<(u64, u64, DateTime<Utc>)>> {
        Ok(self.lock().last_connection_counters.get(connection_id).copied())
    }

    async fn set_last_connection_counters(
        &self,
        connection_id: &str,
        in_bytes: u64,
        out_bytes: u64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.lock()
            .last_connection_counters
            .insert(connection_id.to_string(), (in_bytes, out_bytes, at));
        Ok(())
    }

    async fn get_all_notifications(&self) -> Result<Vec<Notification>> {
        Ok(self.lock().notifications.values().cloned().collect())
    }

    async fn get_subscriptions_for_device(&self, device_id: &str) -> Result<Vec<NotificationSubscription>> {
        Ok(self
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.device_id == device_id)
            .cloned()
            .collect())
    }

    async fn get_duty_schedule(&self) -> Result<Vec<DutyScheduleEntry>> {
        Ok(self.lock().duty_schedule.clone())
    }

    async fn get_user_channels(&self) -> Result<Vec<UserNotificationChannel>> {
        Ok(self.lock().user_channels.clone())
    }

    async fn get_active_mutes(&self) -> Result<Vec<AlarmMute>> {
        Ok(self.lock().mutes.clone())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.lock().settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_device(id: &str) -> Device {
        Device {
            id: id.to_string(),
            name: "test".into(),
            device_type: DeviceType::GenericPing,
            ip_address: Some("10.0.0.1".into()),
            status: DeviceStatus::Unknown,
            credential_profile_id: None,
            custom_credentials: None,
            device_data: DeviceData::default(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_and_get_device_roundtrip() {
        let storage = InMemoryStorage::new();
        storage.upsert_device(sample_device("d1")).await.unwrap();
        let fetched = storage.get_device("d1").await.unwrap().unwrap();
        assert_eq!(fetched.ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn get_device_by_any_ip_falls_back_to_ipam() {
        let storage = InMemoryStorage::new();
        let mut device = sample_device("d2");
        device.ip_address = None;
        storage.upsert_device(device).await.unwrap();
        storage
            .upsert_ipam_address(IpamAddress {
                id: "a1".into(),
                ip_address: "10.0.0.2".into(),
                pool_id: None,
                network_address: None,
                status: IpamAddressStatus::Assigned,
                source: IpamAddressSource::Discovered,
                assigned_device_id: Some("d2".into()),
                assigned_interface_id: None,
                last_seen_at: Utc::now(),
            })
            .await
            .unwrap();

        let found = storage.get_device_by_any_ip("10.0.0.2").await.unwrap();
        assert_eq!(found.unwrap().id, "d2");
    }

    #[tokio::test]
    async fn prune_history_removes_rows_older_than_cutoff() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();
        storage
            .insert_device_metric(DeviceMetricRow {
                device_id: "d1".into(),
                timestamp: now - chrono::Duration::hours(48),
                cpu_pct: Some(1.0),
                memory_pct: None,
                disk_pct: None,
                ping_rtt_ms: None,
                uptime_seconds: None,
            })
            .await
            .unwrap();
        storage
            .insert_device_metric(DeviceMetricRow {
                device_id: "d1".into(),
                timestamp: now,
                cpu_pct: Some(2.0),
                memory_pct: None,
                disk_pct: None,
                ping_rtt_ms: None,
                uptime_seconds: None,
            })
            .await
            .unwrap();

        let pruned = storage
            .prune_history_older_than("device_metrics", now - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(self_len(&storage).await, 1);
    }

    async fn self_len(storage: &InMemoryStorage) -> usize {
        storage.state.lock().unwrap().device_metrics.len()
    }
}
