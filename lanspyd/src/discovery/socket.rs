use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use anyhow::{Context, Result};

/// Open the UDP socket shared by the announcer and the listener.
///
/// Bound to `0.0.0.0:port` with address/port reuse so several instances on one
/// host can listen to the same group. Tokio sockets send and receive
/// concurrently through `&self`, so one `Arc` is enough for both tasks.
pub fn open_multicast(port: u16) -> Result<Arc<UdpSocket>> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("Failed to create UDP socket")?;

    socket
        .set_reuse_address(true)
        .context("Failed to set SO_REUSEADDR")?;

    #[cfg(unix)]
    socket
        .set_reuse_port(true)
        .context("Failed to set SO_REUSEPORT")?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket
        .bind(&addr.into())
        .with_context(|| format!("Failed to bind {}", addr))?;

    // Peers on this host, including ourselves, should see our beacons
    socket
        .set_multicast_loop_v4(true)
        .context("Failed to enable multicast loopback")?;

    socket
        .set_nonblocking(true)
        .context("Failed to set socket non-blocking")?;

    let socket = UdpSocket::from_std(socket.into())
        .context("Failed to register socket with the runtime")?;

    Ok(Arc::new(socket))
}

/// Membership of a multicast group, left again when dropped.
pub struct GroupMembership {
    socket: Arc<UdpSocket>,
    group: Ipv4Addr,
}

impl GroupMembership {
    pub fn join(socket: Arc<UdpSocket>, group: Ipv4Addr) -> Result<Self> {
        socket
            .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
            .with_context(|| format!("Failed to join multicast group {}", group))?;

        tracing::info!("Joined multicast group {}", group);
        Ok(Self { socket, group })
    }
}

impl Drop for GroupMembership {
    fn drop(&mut self) {
        match self.socket.leave_multicast_v4(self.group, Ipv4Addr::UNSPECIFIED) {
            Ok(()) => tracing::info!("Left multicast group {}", self.group),
            Err(e) => tracing::warn!("Failed to leave multicast group {}: {}", self.group, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_ephemeral() {
        let socket = open_multicast(0).unwrap();
        let local = socket.local_addr().unwrap();
        assert!(local.ip().is_unspecified());
        assert_ne!(local.port(), 0);
    }

    #[tokio::test]
    async fn test_reuse_allows_second_bind() {
        let first = open_multicast(0).unwrap();
        let port = first.local_addr().unwrap().port();

        let second = open_multicast(port);
        assert!(second.is_ok(), "Address reuse should allow a second listener");
    }

    #[tokio::test]
    async fn test_membership_left_on_drop() {
        let socket = open_multicast(0).unwrap();
        let group = shared::protocol::DEFAULT_GROUP;

        let membership = GroupMembership::join(socket.clone(), group).unwrap();
        assert!(
            GroupMembership::join(socket.clone(), group).is_err(),
            "A joined group cannot be joined twice on one socket"
        );

        drop(membership);
        let rejoined = GroupMembership::join(socket.clone(), group);
        assert!(rejoined.is_ok(), "Dropping the guard should leave the group");
    }
}
