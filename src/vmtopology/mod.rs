//! Rewrites dynamic `proxmox_vm_host` connections when a tracked VM's
//! current host device changes (i.e. the VM migrated).

use std::sync::Arc;

use crate::error::Result;
use crate::storage::model::{DynamicConnectionType, ProxmoxVm, VmEnd};
use crate::storage::StorageBackend;

pub struct Resolver {
    storage: Arc<dyn StorageBackend>,
}

impl Resolver {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Rewrites the host-side endpoint of every dynamic connection whose
    /// VM endpoint matches one of `vms` and whose host side no longer
    /// points at that VM's current `host_device_id`. The VM-side endpoint
    /// is never touched. Returns the number of connections rewritten.
    pub async fn resolve_migrations(&self, vms: &[ProxmoxVm]) -> Result<usize> {
        let mut rewritten = 0;
        for vm in vms {
            let Some(vm_device_id) = &vm.matched_device_id else { continue };
            let connections = self.storage.get_all_connections().await?;
            for conn in connections {
                if !conn.is_dynamic || conn.dynamic_type != Some(DynamicConnectionType::ProxmoxVmHost) {
                    continue;
                }
                let Some(meta) = &conn.dynamic_metadata else { continue };
                let vm_end = meta.vm_end.unwrap_or(VmEnd::Source);
                let (vm_side, host_side) = match vm_end {
                    VmEnd::Source => (&conn.source_device_id, &conn.target_device_id),
                    VmEnd::Target => (&conn.target_device_id, &conn.source_device_id),
                };
                if vm_side != vm_device_id || host_side == &vm.host_device_id {
                    continue;
                }

                let mut updated = conn.clone();
                let mut new_meta = meta.clone();
                new_meta.last_resolved_host_id = Some(vm.host_device_id.clone());
                new_meta.last_resolved_node_name = Some(vm.node.clone());
                new_meta.state = Some("resolved".to_string());
                match vm_end {
                    VmEnd::Source => {
                        updated.target_device_id = vm.host_device_id.clone();
                        updated.target_port = None;
                    }
                    VmEnd::Target => {
                        updated.source_device_id = vm.host_device_id.clone();
                        updated.source_port = None;
                    }
                }
                updated.dynamic_metadata = Some(new_meta);
                self.storage.upsert_connection(updated).await?;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }
}
