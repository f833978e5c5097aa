use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use shared::protocol::{Beacon, RECV_BUFFER_SIZE};
use shared::types::Device;
use crate::discovery::socket::GroupMembership;
use crate::registry::store::Observation;
use crate::registry_manager::RegistryHandle;

/// Pause after a failed receive so a persistent socket error does not spin.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Turn one received datagram into a device sighting.
pub fn device_from_datagram(payload: &[u8], from: SocketAddr) -> Device {
    let beacon = Beacon::decode(payload);
    let mac = beacon.mac_or_unknown();
    Device::with_identity(beacon.identity(), beacon.name, from.to_string(), mac)
}

/// Join `group` on the shared socket and record every beacon received until
/// cancelled. The group is left on every exit path.
pub async fn run_listener(
    socket: Arc<UdpSocket>,
    group: Ipv4Addr,
    registry: RegistryHandle,
    cancel: CancellationToken,
) -> Result<()> {
    let _membership = GroupMembership::join(socket.clone(), group)?;
    receive_loop(&socket, &registry, &cancel).await
}

/// Receive loop without group management, so it also serves unicast beacons.
pub async fn receive_loop(
    socket: &UdpSocket,
    registry: &RegistryHandle,
    cancel: &CancellationToken,
) -> Result<()> {
    tracing::info!("Starting beacon listener");

    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, from)) => {
                        let device = device_from_datagram(&buf[..len], from);
                        tracing::debug!("Beacon from {}: {}", device.address, device.name);
                        if let Err(e) = registry.upsert(Observation::Device(device)).await {
                            tracing::error!("Failed to record beacon from {}: {}", from, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to receive beacon: {}", e);
                        pause_after_error(cancel).await;
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Beacon listener shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn pause_after_error(cancel: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(RECV_ERROR_BACKOFF) => {}
        _ = cancel.cancelled() => {}
    }
}
