//! Proxmox VE REST adapter for `proxmox` devices.
//!
//! Auth modes modeled as an enum the way `riffcc-jetpack`'s `ProxmoxAuth`
//! splits `Token`/`Password` rather than a single opaque credential blob.

use std::net::IpAddr;
use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::credentials::{ProxmoxAuth, ProxmoxCredentials};
use crate::storage::model::{ProxmoxVmStatus, ProxmoxVmType};

use super::ProbeResult;

/// One guest enumerated from a node's `qemu`/`lxc` listing, prior to
/// device auto-matching (which happens in `vmtopology`/the worker, since
/// it needs the full device table).
#[derive(Debug, Clone)]
pub struct ObservedVm {
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
}

#[derive(Debug, Clone)]
pub struct ObservedNode {
    pub node_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProxmoxProbe {
    pub cluster_name: Option<String>,
    /// Name of the node this API endpoint is local to, per `/cluster/status`'s
    /// `local: 1` marker on the connected node's entry. `None` on a
    /// single-node (non-clustered) install, where `/cluster/status` omits
    /// node entries entirely.
    pub local_node_name: Option<String>,
    pub nodes: Vec<ObservedNode>,
    pub vms: Vec<ObservedVm>,
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ClusterStatusEntry {
    #[serde(rename = "type")]
    entry_type: String,
    name: Option<String>,
    /// Present and `1` on the node entry matching the endpoint we
    /// connected to; absent on every other node and on the cluster entry.
    local: Option<u8>,
}

#[derive(Deserialize)]
struct NodeEntry {
    node: String,
}

#[derive(Deserialize)]
struct GuestEntry {
    vmid: u64,
    name: Option<String>,
    status: Option<String>,
    cpu: Option<f64>,
    mem: Option<u64>,
    maxmem: Option<u64>,
    disk: Option<u64>,
    uptime: Option<u64>,
}

#[derive(Deserialize)]
struct GuestAgentNetworkInterface {
    #[serde(rename = "ip-addresses", default)]
    ip_addresses: Vec<GuestAgentIp>,
    #[serde(rename = "hardware-address", default)]
    hardware_address: Option<String>,
}

#[derive(Deserialize)]
struct GuestAgentIp {
    #[serde(rename = "ip-address")]
    ip_address: String,
}

struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    fn new(ip_address: &str, port: u16, verify_tls: bool) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(Duration::from_secs(8))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self { http, base_url: format!("https://{ip_address}:{port}/api2/json") })
    }

    fn request(&self, path: &str, credentials: &ProxmoxCredentials) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let request = self.http.get(&url);
        match &credentials.auth {
            ProxmoxAuth::Token { token_id, token_secret } => request.header(
                "Authorization",
                format!("PVEAPIToken={}={}", token_id, token_secret.expose_secret()),
            ),
            ProxmoxAuth::Password { .. } => request,
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        credentials: &ProxmoxCredentials,
    ) -> Result<T, String> {
        let response = self
            .request(path, credentials)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("{path} returned HTTP {}", response.status()));
        }
        let envelope: ApiEnvelope<T> = response.json().await.map_err(|e| e.to_string())?;
        Ok(envelope.data)
    }
}

pub async fn probe(
    ip_address: &str,
    port: u16,
    verify_tls: bool,
    credentials: &ProxmoxCredentials,
) -> ProbeResult {
    match probe_inner(ip_address, port, verify_tls, credentials).await {
        Ok(probe) => {
            let mut result = ProbeResult {
                success: true,
                identity: probe.cluster_name.clone(),
                ..Default::default()
            };
            result.custom_metrics.insert("proxmox_vm_count".to_string(), probe.vms.len() as f64);
            result
        }
        Err(e) => ProbeResult::failure(e),
    }
}

/// Returns the structured probe (nodes + VMs), used by the worker to
/// upsert `ProxmoxNode`/`ProxmoxVm` rows and feed the VM topology resolver.
/// The `ProbeResult` returned by `probe` only carries the normalized
/// common fields; this is the adapter-specific detail the worker needs.
pub async fn probe_inner(
    ip_address: &str,
    port: u16,
    verify_tls: bool,
    credentials: &ProxmoxCredentials,
) -> Result<ProxmoxProbe, String> {
    let client = Client::new(ip_address, port, verify_tls)?;

    let cluster_status: Vec<ClusterStatusEntry> = client.get("/cluster/status", credentials).await?;
    let cluster_name = cluster_status
        .iter()
        .find(|e| e.entry_type == "cluster")
        .and_then(|e| e.name.clone());
    let local_node_name = cluster_status
        .iter()
        .find(|e| e.entry_type == "node" && e.local == Some(1))
        .and_then(|e| e.name.clone());

    let nodes: Vec<NodeEntry> = client.get("/nodes", credentials).await?;
    let mut vms = Vec::new();

    for node in &nodes {
        for (kind, path_segment) in [(ProxmoxVmType::Qemu, "qemu"), (ProxmoxVmType::Lxc, "lxc")] {
            let path = format!("/nodes/{}/{}", node.node, path_segment);
            let guests: Vec<GuestEntry> = client.get(&path, credentials).await.unwrap_or_default();
            for guest in guests {
                let (ip_addresses, mac_addresses) =
                    fetch_guest_agent_network(&client, &node.node, path_segment, guest.vmid, credentials).await;
                vms.push(ObservedVm {
                    vmid: guest.vmid,
                    vm_type: kind,
                    name: guest.name.unwrap_or_else(|| format!("vm-{}", guest.vmid)),
                    status: parse_status(guest.status.as_deref()),
                    node: node.node.clone(),
                    cpu_fraction: guest.cpu,
                    memory_bytes: guest.mem,
                    memory_pct: match (guest.mem, guest.maxmem) {
                        (Some(used), Some(max)) if max > 0 => Some(used as f64 / max as f64 * 100.0),
                        _ => None,
                    },
                    disk_bytes: guest.disk,
                    uptime_seconds: guest.uptime,
                    ip_addresses,
                    mac_addresses,
                });
            }
        }
    }

    Ok(ProxmoxProbe {
        cluster_name,
        local_node_name,
        nodes: nodes.into_iter().map(|n| ObservedNode { node_name: n.node }).collect(),
        vms,
    })
}

async fn fetch_guest_agent_network(
    client: &Client,
    node: &str,
    kind: &str,
    vmid: u64,
    credentials: &ProxmoxCredentials,
) -> (Vec<String>, Vec<String>) {
    if kind != "qemu" {
        return (Vec::new(), Vec::new());
    }
    let path = format!("/nodes/{node}/qemu/{vmid}/agent/network-get-interfaces");
    let Ok(interfaces): Result<Vec<GuestAgentNetworkInterface>, String> =
        client.get(&path, credentials).await
    else {
        return (Vec::new(), Vec::new());
    };
    let mut ips = Vec::new();
    let mut macs = Vec::new();
    for iface in interfaces {
        for ip in iface.ip_addresses {
            ips.push(ip.ip_address);
        }
        if let Some(mac) = iface.hardware_address {
            macs.push(mac);
        }
    }
    (ips, macs)
}

fn parse_status(status: Option<&str>) -> ProxmoxVmStatus {
    match status {
        Some("running") => ProxmoxVmStatus::Running,
        Some("stopped") => ProxmoxVmStatus::Stopped,
        Some("paused") => ProxmoxVmStatus::Paused,
        _ => ProxmoxVmStatus::Unknown,
    }
}

/// Candidate-IP filtering for VM auto-matching: skip loopback,
/// link-local, and IPv6 link-local addresses before searching for a
/// matching device.
#[must_use]
pub fn is_matchable_candidate_ip(ip: &str) -> bool {
    let Ok(parsed) = ip.parse::<IpAddr>() else { return false };
    match parsed {
        IpAddr::V4(v4) => !v4.is_loopback() && !v4.is_link_local(),
        IpAddr::V6(v6) => !v6.is_loopback() && !is_ipv6_link_local(v6),
    }
}

fn is_ipv6_link_local(addr: std::net::Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_loopback_and_link_local() {
        assert!(!is_matchable_candidate_ip("127.0.0.1"));
        assert!(!is_matchable_candidate_ip("169.254.1.1"));
        assert!(!is_matchable_candidate_ip("fe80::1"));
        assert!(is_matchable_candidate_ip("192.168.1.10"));
    }

    #[test]
    fn parses_known_statuses() {
        assert_eq!(parse_status(Some("running")), ProxmoxVmStatus::Running);
        assert_eq!(parse_status(Some("paused")), ProxmoxVmStatus::Paused);
        assert_eq!(parse_status(Some("bogus")), ProxmoxVmStatus::Unknown);
        assert_eq!(parse_status(None), ProxmoxVmStatus::Unknown);
    }
}
