use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use shared::protocol::Beacon;

/// Send `beacon` to `target` every `period`, the first one immediately.
///
/// Shares the socket with the listener and never waits on it. A failed send
/// is logged and retried on the next tick.
pub async fn run_announcer(
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    beacon: Beacon,
    period: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!("Announcing to {} every {:?}", target, period);

    let payload = beacon.encode();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match socket.send_to(&payload, target).await {
                    Ok(_) => tracing::trace!("Sent beacon to {}", target),
                    Err(e) => tracing::warn!("Failed to send beacon to {}: {}", target, e),
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Announcer shutting down");
                break;
            }
        }
    }

    Ok(())
}
