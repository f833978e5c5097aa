//! Periodic enumeration of the host's own interfaces.
//!
//! Every routable address becomes a client record. Interfaces carrying
//! loopback or link-local addresses are surfaced as network services instead,
//! since those addresses only tell us the interface is up.

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use shared::address::{format_mac, is_local_only};
use shared::types::{Client, NetworkService};
use crate::registry::store::Observation;
use crate::registry_manager::RegistryHandle;

/// The parts of an OS interface the scanner cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceInfo {
    pub name: String,
    pub display_name: String,
    pub index: u32,
    pub mac: Option<[u8; 6]>,
    pub mtu: Option<u32>,
    pub addrs: Vec<IpAddr>,
}

impl From<&pnet::datalink::NetworkInterface> for InterfaceInfo {
    fn from(iface: &pnet::datalink::NetworkInterface) -> Self {
        let display_name = if iface.description.is_empty() {
            iface.name.clone()
        } else {
            iface.description.clone()
        };

        // Loopback reports an all-zero address; treat it as having none
        let mac = iface
            .mac
            .map(|pnet::datalink::MacAddr(a, b, c, d, e, f)| [a, b, c, d, e, f])
            .filter(|octets| octets.iter().any(|&b| b != 0));

        Self {
            name: iface.name.clone(),
            display_name,
            index: iface.index,
            mac,
            mtu: read_mtu(&iface.name),
            addrs: iface.ips.iter().map(|net| net.ip()).collect(),
        }
    }
}

#[cfg(target_os = "linux")]
fn read_mtu(name: &str) -> Option<u32> {
    std::fs::read_to_string(format!("/sys/class/net/{}/mtu", name))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(not(target_os = "linux"))]
fn read_mtu(_name: &str) -> Option<u32> {
    None
}

/// Enumerate interfaces on the blocking pool.
pub async fn enumerate_interfaces() -> Result<Vec<InterfaceInfo>> {
    tokio::task::spawn_blocking(|| {
        pnet::datalink::interfaces()
            .iter()
            .map(InterfaceInfo::from)
            .collect()
    })
    .await
    .context("Interface enumeration task failed")
}

/// Classify one interface's addresses into observations.
///
/// At most one network service is produced per interface, however many
/// local-only addresses it carries.
pub fn classify_interface(iface: &InterfaceInfo, host_name: Option<&str>) -> Vec<Observation> {
    let mac = format_mac(iface.mac.as_ref().map(|m| m.as_slice()));
    let mut observations = Vec::new();
    let mut service_recorded = false;

    for addr in &iface.addrs {
        if !is_local_only(addr) {
            let address = addr.to_string();
            let name = host_name.map(str::to_string).unwrap_or_else(|| address.clone());
            observations.push(Observation::Client(Client::new(
                name,
                address,
                mac.clone(),
                iface.display_name.clone(),
            )));
        } else if !service_recorded {
            service_recorded = true;
            observations.push(Observation::NetworkService(NetworkService::new(
                iface.name.clone(),
                format_addrs(&iface.addrs),
                mac.clone(),
                iface.index.to_string(),
                iface.mtu,
                iface.display_name.clone(),
            )));
        }
    }

    observations
}

fn format_addrs(addrs: &[IpAddr]) -> String {
    let joined = addrs
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", joined)
}

fn local_host_name() -> Option<String> {
    match hostname::get() {
        Ok(name) => Some(name.to_string_lossy().to_string()),
        Err(e) => {
            tracing::warn!("Failed to get system hostname: {}", e);
            None
        }
    }
}

/// Write one pass worth of interfaces into the registry. Returns how many
/// observations were recorded.
pub async fn record_interfaces(
    registry: &RegistryHandle,
    interfaces: &[InterfaceInfo],
    host_name: Option<&str>,
) -> Result<usize> {
    let mut recorded = 0;

    for iface in interfaces {
        for observation in classify_interface(iface, host_name) {
            tracing::debug!("Observed {} {}", observation.kind().as_str(), observation.key());
            registry
                .upsert(observation)
                .await
                .with_context(|| format!("Failed to record interface {}", iface.name))?;
            recorded += 1;
        }
    }

    Ok(recorded)
}

/// One full scan pass
async fn scan_pass<Fut>(registry: &RegistryHandle, interfaces: Fut) -> Result<usize>
where
    Fut: Future<Output = Result<Vec<InterfaceInfo>>>,
{
    let interfaces = interfaces.await?;
    let host_name = local_host_name();
    record_interfaces(registry, &interfaces, host_name.as_deref()).await
}

/// Scanner loop over the host's interfaces.
pub async fn run_scanner(
    registry: RegistryHandle,
    delayed_check: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    run_scanner_with(registry, delayed_check, cancel, enumerate_interfaces).await
}

/// Scanner loop - runs a pass over whatever `enumerate` yields, then waits
/// `delayed_check`. Failed passes are logged and retried after the same delay.
pub async fn run_scanner_with<F, Fut>(
    registry: RegistryHandle,
    delayed_check: Duration,
    cancel: CancellationToken,
    mut enumerate: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<InterfaceInfo>>>,
{
    tracing::info!("Starting interface scanner every {:?}", delayed_check);

    loop {
        tokio::select! {
            result = scan_pass(&registry, enumerate()) => match result {
                Ok(count) => tracing::debug!("Interface scan recorded {} entries", count),
                Err(e) => tracing::error!("Interface scan failed: {:#}", e),
            },
            _ = cancel.cancelled() => {
                tracing::info!("Interface scanner shutting down");
                break;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(delayed_check) => {}
            _ = cancel.cancelled() => {
                tracing::info!("Interface scanner shutting down");
                break;
            }
        }
    }

    Ok(())
}
