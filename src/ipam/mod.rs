//! IPAM reconciliation: upserts discovered interface addresses into the
//! address/pool/assignment tables, preserving manually-entered rows and
//! retiring addresses no longer seen on a device.

pub mod pool;

use std::collections::HashSet;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use ipnetwork::Ipv4Network;

use crate::adapters::InterfaceAddressObservation;
use crate::error::Result;
use crate::storage::model::{IpamAddress, IpamAddressSource, IpamAddressStatus, IpamAssignment};
use crate::storage::StorageBackend;

pub struct Reconciler {
    storage: Arc<dyn StorageBackend>,
}

impl Reconciler {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Upserts every observation from one device's probe, then marks any
    /// address previously discovered on this device but absent from this
    /// pass as offline.
    pub async fn reconcile_device(
        &self,
        device_id: &str,
        observations: &[InterfaceAddressObservation],
    ) -> Result<()> {
        let pools = self.storage.get_all_ipam_pools().await?;
        let interfaces = self.storage.get_interfaces_for_device(device_id).await?;
        let now = Utc::now();
        let mut seen_ips = HashSet::new();

        for obs in observations {
            let Ok(ip) = IpAddr::from_str(&obs.ip_address) else {
                tracing::debug!(ip = %obs.ip_address, "skipping unparsable IPAM observation");
                continue;
            };
            let canonical = ip.to_string();
            seen_ips.insert(canonical.clone());

            let network_address = obs.prefix_len.and_then(|prefix| match ip {
                IpAddr::V4(v4) => Ipv4Network::new(v4, prefix).ok().map(|n| n.network().to_string()),
                IpAddr::V6(_) => None,
            });
            let pool_id = pool::find_pool_for_ip(&ip, &pools).map(|p| p.id.clone());
            let interface_id = interfaces.iter().find(|i| i.name == obs.interface_name).map(|i| i.id.clone());

            let existing = self.storage.get_ipam_address(&canonical).await?;
            let id = existing.as_ref().map_or_else(|| format!("ipam-{canonical}"), |e| e.id.clone());
            let source = match &existing {
                // Discovered addresses never overwrite a manually-entered source marker.
                Some(e) if e.source == IpamAddressSource::Manual => IpamAddressSource::Manual,
                _ => IpamAddressSource::Discovered,
            };

            let address = IpamAddress {
                id: id.clone(),
                ip_address: canonical,
                pool_id: pool_id.or_else(|| existing.as_ref().and_then(|e| e.pool_id.clone())),
                network_address: network_address.or_else(|| existing.as_ref().and_then(|e| e.network_address.clone())),
                status: if obs.disabled { IpamAddressStatus::Reserved } else { IpamAddressStatus::Assigned },
                source,
                assigned_device_id: Some(device_id.to_string()),
                assigned_interface_id: interface_id.clone().or_else(|| existing.as_ref().and_then(|e| e.assigned_interface_id.clone())),
                last_seen_at: now,
            };
            self.storage.upsert_ipam_address(address).await?;

            self.storage
                .upsert_ipam_assignment(IpamAssignment {
                    id: format!("{id}|{device_id}"),
                    address_id: id,
                    device_id: device_id.to_string(),
                    interface_id,
                })
                .await?;
        }

        for addr in self.storage.get_all_ipam_addresses().await? {
            let stale = addr.assigned_device_id.as_deref() == Some(device_id)
                && addr.source == IpamAddressSource::Discovered
                && addr.status != IpamAddressStatus::Offline
                && !seen_ips.contains(&addr.ip_address);
            if stale {
                let mut updated = addr;
                updated.status = IpamAddressStatus::Offline;
                self.storage.upsert_ipam_address(updated).await?;
            }
        }

        Ok(())
    }
}
