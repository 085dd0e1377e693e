//! One-time cleanup run before the Scheduler starts (`spec.md` §4.8):
//! dedup any legacy rows violating the `(deviceId, name)` /
//! `(hostDeviceId, vmid)` uniqueness invariants, keeping the
//! most-recently-seen row. Failures are logged and tolerated — the
//! Scheduler still starts even if cleanup couldn't run.

use std::collections::HashMap;
use std::sync::Arc;

use crate::storage::StorageBackend;

pub async fn run_startup_tasks(storage: &Arc<dyn StorageBackend>) {
    if let Err(e) = dedup_device_interfaces(storage).await {
        tracing::error!(error = %e, "startup: device interface dedup failed");
    }
    if let Err(e) = dedup_proxmox_vms(storage).await {
        tracing::error!(error = %e, "startup: proxmox VM dedup failed");
    }
}

async fn dedup_device_interfaces(storage: &Arc<dyn StorageBackend>) -> crate::error::Result<()> {
    let devices = storage.get_all_devices().await?;
    for device in devices {
        let interfaces = storage.get_interfaces_for_device(&device.id).await?;
        let mut latest: HashMap<String, crate::storage::model::DeviceInterface> = HashMap::new();
        let mut stale_ids = Vec::new();

        for iface in interfaces {
            match latest.get(&iface.name) {
                Some(existing) if existing.last_seen_at >= iface.last_seen_at => stale_ids.push(iface.id),
                Some(existing) => {
                    stale_ids.push(existing.id.clone());
                    latest.insert(iface.name.clone(), iface);
                }
                None => {
                    latest.insert(iface.name.clone(), iface);
                }
            }
        }

        for id in stale_ids {
            tracing::debug!(device_id = %device.id, interface_id = %id, "dropping duplicate device interface");
            storage.delete_device_interface(&id).await?;
        }
    }
    Ok(())
}

async fn dedup_proxmox_vms(storage: &Arc<dyn StorageBackend>) -> crate::error::Result<()> {
    let vms = storage.get_all_proxmox_vms().await?;
    let mut latest: HashMap<(String, u64), crate::storage::model::ProxmoxVm> = HashMap::new();
    let mut stale_ids = Vec::new();

    for vm in vms {
        let key = (vm.host_device_id.clone(), vm.vmid);
        match latest.get(&key) {
            Some(existing) if existing.last_seen >= vm.last_seen => stale_ids.push(vm.id),
            Some(existing) => {
                stale_ids.push(existing.id.clone());
                latest.insert(key, vm);
            }
            None => {
                latest.insert(key, vm);
            }
        }
    }

    for id in stale_ids {
        tracing::debug!(vm_id = %id, "dropping duplicate proxmox VM");
        storage.delete_proxmox_vm(&id).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStorage;
    use crate::storage::model::{
        Device, DeviceData, DeviceInterface, DeviceType, InterfaceDiscoverySource,
        ProxmoxVm, ProxmoxVmStatus, ProxmoxVmType,
    };
    use chrono::{Duration, Utc};

    fn device(id: &str) -> Device {
        Device {
            id: id.into(),
            name: id.into(),
            device_type: DeviceType::MikrotikRouter,
            ip_address: Some("10.0.0.1".into()),
            status: crate::storage::model::DeviceStatus::Unknown,
            credential_profile_id: None,
            custom_credentials: None,
            device_data: DeviceData::default(),
            updated_at: Utc::now(),
        }
    }

    fn iface(id: &str, device_id: &str, name: &str, last_seen_at: chrono::DateTime<Utc>) -> DeviceInterface {
        DeviceInterface {
            id: id.into(),
            device_id: device_id.into(),
            name: name.into(),
            interface_type: "ether".into(),
            oper_status: "up".into(),
            admin_status: "up".into(),
            speed: None,
            mac_address: None,
            parent_interface_id: None,
            discovery_source: InterfaceDiscoverySource::Probe,
            last_seen_at,
        }
    }

    #[tokio::test]
    async fn keeps_most_recently_seen_interface() {
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        storage.upsert_device(device("d1")).await.unwrap();
        let now = Utc::now();
        storage.upsert_device_interface(iface("old", "d1", "ether1", now - Duration::hours(1))).await.unwrap();
        storage.upsert_device_interface(iface("new", "d1", "ether1", now)).await.unwrap();

        dedup_device_interfaces(&storage).await.unwrap();

        let remaining = storage.get_interfaces_for_device("d1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "new");
    }

    #[tokio::test]
    async fn keeps_most_recently_seen_proxmox_vm() {
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        let now = Utc::now();
        let base = ProxmoxVm {
            id: "old".into(),
            host_device_id: "host1".into(),
            vmid: 101,
            vm_type: ProxmoxVmType::Qemu,
            name: "vm101".into(),
            status: ProxmoxVmStatus::Running,
            node: "pve1".into(),
            cpu_fraction: None,
            memory_bytes: None,
            memory_pct: None,
            disk_bytes: None,
            uptime_seconds: None,
            ip_addresses: vec![],
            mac_addresses: vec![],
            matched_device_id: None,
            cluster_name: Some("cluster1".into()),
            last_seen: now - Duration::minutes(5),
        };
        storage.upsert_proxmox_vm(base.clone()).await.unwrap();
        storage.upsert_proxmox_vm(ProxmoxVm { id: "new".into(), last_seen: now, ..base }).await.unwrap();

        dedup_proxmox_vms(&storage).await.unwrap();

        let remaining = storage.get_all_proxmox_vms().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "new");
    }
}
