//! Periodic device-polling scheduler (`spec.md` §4.1): a bounded worker
//! pool, cycle-skip guard, detailed-cycle cadence, and the Mikrotik
//! link-state trigger.

pub mod ping;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{watch, Semaphore};

use crate::adapters::proxmox::is_matchable_candidate_ip;
use crate::adapters::{self, Adapter, ProbeOptions, ProbeResult};
use crate::config::Config;
use crate::credentials::{DeviceCredentials, SnmpCredentials};
use crate::history::Ingestor;
use crate::ipam::Reconciler;
use crate::notifications::Dispatcher;
use crate::status::StatusEngine;
use crate::storage::model::{Device, DeviceStatus, PortStatus, ProxmoxNode, ProxmoxVm};
use crate::storage::StorageBackend;
use crate::vmtopology;

/// `total / success / timeout / error` counts plus wall time for one
/// cycle, returned for tests and logged at `info`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CycleReport {
    pub total: usize,
    pub success: usize,
    pub timeout: usize,
    pub error: usize,
    pub wall_time_ms: u64,
}

enum TaskOutcome {
    Success,
    Timeout,
    Error,
}

pub struct Scheduler {
    storage: Arc<dyn StorageBackend>,
    status: Arc<StatusEngine>,
    ipam: Arc<Reconciler>,
    vmtopology: Arc<vmtopology::Resolver>,
    ingestor: Arc<Ingestor>,
    config: Config,
    semaphore: Arc<Semaphore>,
    probing: AtomicBool,
    cycle_counter: AtomicU64,
    port_cache: Mutex<HashMap<String, Vec<PortStatus>>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, transport: Arc<dyn crate::notifications::transport::NotificationTransport>, config: Config) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(storage.clone(), transport));
        Self {
            status: Arc::new(StatusEngine::new(storage.clone(), dispatcher)),
            ipam: Arc::new(Reconciler::new(storage.clone())),
            vmtopology: Arc::new(vmtopology::Resolver::new(storage.clone())),
            ingestor: Arc::new(Ingestor::new(storage.clone())),
            semaphore: Arc::new(Semaphore::new(config.concurrency_ceiling)),
            probing: AtomicBool::new(false),
            cycle_counter: AtomicU64::new(0),
            port_cache: Mutex::new(HashMap::new()),
            storage,
            config,
        }
    }

    #[must_use]
    pub fn ingestor(&self) -> Arc<Ingestor> {
        self.ingestor.clone()
    }

    /// Spawns the ticker loop, running one cycle per `polling_interval`
    /// and stopping when `shutdown_rx` reports `true`.
    pub fn start(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let interval_secs = self.config.polling_interval_secs;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {},
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("stopping scheduler");
                            break;
                        }
                    }
                }
                let report = self.run_cycle().await;
                tracing::info!(
                    total = report.total, success = report.success, timeout = report.timeout,
                    error = report.error, wall_time_ms = report.wall_time_ms, "cycle complete"
                );
            }
        })
    }

    /// Runs one poll cycle over every device with an IP address. Skips
    /// (and logs) if the previous cycle is still draining.
    pub async fn run_cycle(&self) -> CycleReport {
        if self.probing.swap(true, Ordering::SeqCst) {
            tracing::debug!("cycle skipped, previous cycle still probing");
            return CycleReport::default();
        }
        let report = self.run_cycle_inner().await;
        self.probing.store(false, Ordering::SeqCst);
        report
    }

    async fn run_cycle_inner(&self) -> CycleReport {
        let cycle = self.cycle_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let detailed_cycle = cycle % self.config.detailed_cycle_interval == 0;
        let start = Instant::now();

        let devices = match self.storage.get_all_devices().await {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(error = %e, "failed to load device inventory");
                return CycleReport::default();
            }
        };
        // Ping-only devices are serviced by the independent batch pinger
        // (`scheduler::ping`), never by this worker pool.
        let devices: Vec<Device> = devices
            .into_iter()
            .filter(|d| d.ip_address.is_some() && d.device_type != crate::storage::model::DeviceType::GenericPing)
            .collect();

        let mut handles = Vec::with_capacity(devices.len());
        for device in devices {
            let semaphore = self.semaphore.clone();
            let permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            let storage = self.storage.clone();
            let status = self.status.clone();
            let ipam = self.ipam.clone();
            let vmtopology = self.vmtopology.clone();
            let ingestor = self.ingestor.clone();
            let deadline_ms = self.config.probe_deadline_ms;
            let previous_ports = self.port_cache.lock().unwrap().get(&device.id).cloned().unwrap_or_default();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = probe_one_device(
                    &storage, &status, &ipam, &vmtopology, &ingestor,
                    device, detailed_cycle, previous_ports, deadline_ms,
                ).await;
                outcome
            }));
        }

        let mut report = CycleReport { total: handles.len(), wall_time_ms: 0, ..Default::default() };
        for handle in handles {
            match handle.await {
                Ok((outcome, device_id, ports)) => {
                    match outcome {
                        TaskOutcome::Success => report.success += 1,
                        TaskOutcome::Timeout => report.timeout += 1,
                        TaskOutcome::Error => report.error += 1,
                    }
                    if let Some(ports) = ports {
                        self.port_cache.lock().unwrap().insert(device_id, ports);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "device probe task panicked");
                    report.error += 1;
                }
            }
        }
        report.wall_time_ms = start.elapsed().as_millis() as u64;
        report
    }
}

/// Resolves a device's credentials: inline `customCredentials` win over a
/// linked `credentialProfileId`.
async fn resolve_credentials(device: &Device, storage: &Arc<dyn StorageBackend>) -> Option<DeviceCredentials> {
    if let Some(creds) = &device.custom_credentials {
        return Some(creds.clone());
    }
    let profile_id = device.credential_profile_id.as_ref()?;
    let profile = storage.get_credential_profile(profile_id).await.ok()??;
    Some(profile.credentials)
}

/// True if any port matched by `default_name` (fallback `name`) against
/// `previous` transitioned from down to up in `current`.
fn link_flapped_up(previous: &[PortStatus], current: &[PortStatus]) -> bool {
    current.iter().any(|port| {
        let was_up = previous
            .iter()
            .find(|p| match (&p.default_name, &port.default_name) {
                (Some(a), Some(b)) => a == b,
                _ => p.name == port.name,
            })
            .map(|p| p.up);
        matches!(was_up, Some(false)) && port.up
    })
}

/// Runs one device's full probe → reconcile → persist pipeline. Returns
/// the outcome, the device id (for port-cache bookkeeping), and the
/// fresh port set when the probe succeeded.
async fn probe_one_device(
    storage: &Arc<dyn StorageBackend>,
    status: &Arc<StatusEngine>,
    ipam: &Arc<Reconciler>,
    vmtopology: &Arc<vmtopology::Resolver>,
    ingestor: &Arc<Ingestor>,
    mut device: Device,
    detailed_cycle: bool,
    previous_ports: Vec<PortStatus>,
    deadline_ms: u64,
) -> (TaskOutcome, String, Option<Vec<PortStatus>>) {
    let Some(ip_address) = device.ip_address.clone() else {
        return (TaskOutcome::Error, device.id, None);
    };
    let credentials = resolve_credentials(&device, storage).await;
    let Some(adapter) = Adapter::for_device(device.device_type, credentials.as_ref()) else {
        tracing::warn!(device_id = %device.id, "no adapter for device type");
        return (TaskOutcome::Error, device.id, None);
    };

    let is_mikrotik = device.device_type.is_mikrotik();
    let options = ProbeOptions { detailed: detailed_cycle, monitor_interface: None, previous_ports: previous_ports.clone() };
    let deadline = Duration::from_millis(deadline_ms);

    let first = tokio::time::timeout(deadline, adapter.probe(&ip_address, credentials.as_ref(), &options)).await;
    let mut result = match first {
        Ok(r) => r,
        Err(_) => {
            apply_failure(storage, status, &mut device, "probe deadline exceeded").await;
            return (TaskOutcome::Timeout, device.id, None);
        }
    };

    if is_mikrotik && !detailed_cycle && result.success && link_flapped_up(&previous_ports, &result.ports) {
        tracing::debug!(device_id = %device.id, "link flap detected, promoting to detailed probe");
        let options = ProbeOptions { detailed: true, monitor_interface: None, previous_ports };
        match tokio::time::timeout(deadline, adapter.probe(&ip_address, credentials.as_ref(), &options)).await {
            Ok(r) => result = r,
            Err(_) => {
                apply_failure(storage, status, &mut device, "probe deadline exceeded on detailed retry").await;
                return (TaskOutcome::Timeout, device.id, None);
            }
        }
    }

    let ports = if result.success { Some(result.ports.clone()) } else { None };
    let outcome = if result.success { TaskOutcome::Success } else { TaskOutcome::Error };

    apply_result(storage, status, ipam, ingestor, &mut device, &result).await;

    if result.success {
        if let Some(DeviceCredentials::Snmp(creds)) = &credentials {
            probe_monitored_connections(storage, ingestor, &device.id, &ip_address, creds).await;
        }
    }

    if device.device_type == crate::storage::model::DeviceType::Proxmox && result.success {
        if let Some(DeviceCredentials::Proxmox(creds)) = &credentials {
            reconcile_proxmox(storage, vmtopology, &device, &ip_address, creds).await;
        }
    }

    (outcome, device.id.clone(), ports)
}

/// Samples traffic counters for every connection that names this device as
/// an endpoint with a `monitor_interface` set, feeding each reading to the
/// bandwidth ingestor. Best-effort: a missing interface or SNMP failure on
/// one connection logs and moves on rather than failing the whole cycle.
async fn probe_monitored_connections(
    storage: &Arc<dyn StorageBackend>,
    ingestor: &Arc<Ingestor>,
    device_id: &str,
    ip_address: &str,
    creds: &SnmpCredentials,
) {
    let connections = match storage.get_all_connections().await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(device_id, error = %e, "failed to load connections for counter probing");
            return;
        }
    };
    let port = creds.port.unwrap_or(161);

    for conn in connections {
        let is_endpoint = conn.source_device_id == device_id || conn.target_device_id == device_id;
        let Some(interface_name) = conn.monitor_interface.as_deref().filter(|_| is_endpoint) else {
            continue;
        };

        match adapters::snmp::probe_interface_counters(ip_address, port, creds, interface_name).await {
            Ok(sample) => {
                if let Err(e) = ingestor.record_connection_counters(&conn.id, sample.in_octets, sample.out_octets, sample.taken_at).await {
                    tracing::warn!(device_id, connection_id = %conn.id, error = %e, "failed to record connection counters");
                }
            }
            Err(e) => {
                tracing::warn!(device_id, connection_id = %conn.id, interface = interface_name, error = %e, "interface counter probe failed");
            }
        }
    }
}

async fn apply_failure(storage: &Arc<dyn StorageBackend>, status: &Arc<StatusEngine>, device: &mut Device, reason: &str) {
    tracing::warn!(device_id = %device.id, reason, "probe failed");
    let _ = status.apply(device, DeviceStatus::Offline).await;
    device.updated_at = Utc::now();
    if let Err(e) = storage.upsert_device(device.clone()).await {
        tracing::error!(device_id = %device.id, error = %e, "failed to persist device after probe failure");
    }
}

/// Derives status, writes the mutated device row, feeds history and IPAM.
/// Timeouts and errors flip status to offline while preserving the last
/// known `deviceData` snapshot (spec's failure-semantics invariant).
async fn apply_result(
    storage: &Arc<dyn StorageBackend>,
    status: &Arc<StatusEngine>,
    ipam: &Arc<Reconciler>,
    ingestor: &Arc<Ingestor>,
    device: &mut Device,
    result: &ProbeResult,
) {
    let derived = StatusEngine::derive_status(result);
    if result.success {
        device.device_data.identity = result.identity.clone();
        device.device_data.model = result.model.clone();
        device.device_data.version = result.version.clone();
        device.device_data.uptime_seconds = result.uptime_seconds;
        device.device_data.cpu_usage_pct = result.cpu_usage_pct;
        device.device_data.memory_usage_pct = result.memory_usage_pct;
        device.device_data.disk_usage_pct = result.disk_usage_pct;
        if !result.ports.is_empty() {
            device.device_data.ports = result.ports.clone();
        }
        for (name, value) in &result.custom_metrics {
            device.device_data.custom_metrics.insert(name.clone(), *value);
        }
    }

    if let Err(e) = status.apply(device, derived).await {
        tracing::error!(device_id = %device.id, error = %e, "failed to apply status transition");
    }
    device.updated_at = Utc::now();
    if let Err(e) = storage.upsert_device(device.clone()).await {
        tracing::error!(device_id = %device.id, error = %e, "failed to persist device");
    }

    if let Err(e) = ingestor.record_device_metrics(&device.id, result, None).await {
        tracing::warn!(device_id = %device.id, error = %e, "failed to record device metrics");
    }

    if result.success && !result.interface_addresses.is_empty() {
        if let Err(e) = ipam.reconcile_device(&device.id, &result.interface_addresses).await {
            tracing::warn!(device_id = %device.id, error = %e, "IPAM reconciliation failed");
        }
    }
}

/// Proxmox-specific follow-up after the normalized probe: enumerates
/// nodes/VMs, upserts `ProxmoxNode`/`ProxmoxVm`, auto-matches VMs to
/// devices by candidate IP, and resolves any host migrations.
async fn reconcile_proxmox(
    storage: &Arc<dyn StorageBackend>,
    vmtopology: &Arc<vmtopology::Resolver>,
    device: &Device,
    ip_address: &str,
    creds: &crate::credentials::ProxmoxCredentials,
) {
    let probe = match adapters::proxmox::probe_inner(ip_address, creds.port.unwrap_or(8006), creds.verify_tls, creds).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(device_id = %device.id, error = %e, "proxmox detail probe failed");
            return;
        }
    };
    let Some(cluster_name) = probe.cluster_name.clone() else { return };
    let now = Utc::now();

    if let Some(local_node) = &probe.local_node_name {
        if let Err(e) = storage
            .upsert_proxmox_node(ProxmoxNode {
                cluster_name: cluster_name.clone(),
                node_name: local_node.clone(),
                host_device_id: device.id.clone(),
                last_seen: now,
            })
            .await
        {
            tracing::warn!(device_id = %device.id, error = %e, "failed to upsert proxmox node");
        }
    }

    let known_nodes = storage.get_all_proxmox_nodes().await.unwrap_or_default();
    let mut upserted = Vec::with_capacity(probe.vms.len());

    for vm in probe.vms {
        let host_device_id = if Some(&vm.node) == probe.local_node_name.as_ref() {
            device.id.clone()
        } else if let Some(node) = known_nodes.iter().find(|n| n.cluster_name == cluster_name && n.node_name == vm.node) {
            node.host_device_id.clone()
        } else {
            // No device yet known for this peer node; attribute it to the
            // probed device rather than dropping the VM from inventory.
            device.id.clone()
        };

        let mut matched_device_id = None;
        for ip in vm.ip_addresses.iter().filter(|ip| is_matchable_candidate_ip(ip)) {
            if let Ok(Some(matched)) = storage.get_device_by_any_ip(ip).await {
                matched_device_id = Some(matched.id);
                break;
            }
        }

        let row = ProxmoxVm {
            id: format!("proxmox-vm-{host_device_id}-{}", vm.vmid),
            host_device_id,
            vmid: vm.vmid,
            vm_type: vm.vm_type,
            name: vm.name,
            status: vm.status,
            node: vm.node,
            cpu_fraction: vm.cpu_fraction,
            memory_bytes: vm.memory_bytes,
            memory_pct: vm.memory_pct,
            disk_bytes: vm.disk_bytes,
            uptime_seconds: vm.uptime_seconds,
            ip_addresses: vm.ip_addresses,
            mac_addresses: vm.mac_addresses,
            matched_device_id,
            cluster_name: Some(cluster_name.clone()),
            last_seen: now,
        };
        if let Err(e) = storage.upsert_proxmox_vm(row.clone()).await {
            tracing::warn!(device_id = %device.id, error = %e, "failed to upsert proxmox vm");
        } else {
            upserted.push(row);
        }
    }

    if let Err(e) = vmtopology.resolve_migrations(&upserted).await {
        tracing::warn!(device_id = %device.id, error = %e, "vm topology resolution failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::SnmpVersion;
    use crate::storage::memory::InMemoryStorage;
    use crate::storage::model::PortStatus;

    #[tokio::test]
    async fn probe_monitored_connections_is_a_noop_with_no_matching_connection() {
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        let ingestor = Arc::new(Ingestor::new(storage.clone()));
        let creds = SnmpCredentials { version: SnmpVersion::V2c, community: None, v3: None, port: None };
        // No connections registered at all, so the endpoint scan finds nothing to probe.
        probe_monitored_connections(&storage, &ingestor, "d1", "127.0.0.1", &creds).await;
        assert!(storage.get_last_connection_counters("c1").await.unwrap().is_none());
    }

    fn port(name: &str, default_name: &str, up: bool) -> PortStatus {
        PortStatus { name: name.into(), default_name: Some(default_name.into()), comment: None, up, speed: None }
    }

    #[test]
    fn detects_down_to_up_transition() {
        let previous = vec![port("ether1", "ether1", false)];
        let current = vec![port("ether1", "ether1", true)];
        assert!(link_flapped_up(&previous, &current));
    }

    #[test]
    fn no_trigger_when_already_up() {
        let previous = vec![port("ether1", "ether1", true)];
        let current = vec![port("ether1", "ether1", true)];
        assert!(!link_flapped_up(&previous, &current));
    }

    #[test]
    fn no_trigger_on_up_to_down_transition() {
        let previous = vec![port("ether1", "ether1", true)];
        let current = vec![port("ether1", "ether1", false)];
        assert!(!link_flapped_up(&previous, &current));
    }

    #[test]
    fn matches_by_name_when_default_name_absent() {
        let previous = vec![PortStatus { name: "ether1".into(), default_name: None, comment: None, up: false, speed: None }];
        let current = vec![PortStatus { name: "ether1".into(), default_name: None, comment: None, up: true, speed: None }];
        assert!(link_flapped_up(&previous, &current));
    }
}
