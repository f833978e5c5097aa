use std::net::Ipv4Addr;

use crate::address;
use crate::types::device_key;

/// Default multicast group the beacons are exchanged on
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(228, 5, 6, 7);

/// Default UDP port for beacons
pub const DEFAULT_PORT: u16 = 5000;

/// Payload sent by the announcer
pub const ANNOUNCE_PAYLOAD: &str = "discovering";

/// Receive buffer size; longer datagrams are truncated
pub const RECV_BUFFER_SIZE: usize = 1024;

/// Sentinel used wherever a hardware address cannot be resolved
pub const UNKNOWN_MAC: &str = "unknown";

/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// A decoded discovery beacon.
///
/// On the wire a beacon is UTF-8 text: the sender's display name, optionally
/// followed by `\n` and its MAC in `XX-XX-XX-XX-XX-XX` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub name: String,
    pub mac: Option<String>,

    /// Payload text as received (lossy UTF-8)
    raw: String,
}

impl Beacon {
    pub fn new(name: impl Into<String>, mac: Option<String>) -> Self {
        let name = name.into();
        let raw = match &mac {
            Some(mac) => format!("{}\n{}", name, mac),
            None => name.clone(),
        };
        Self { name, mac, raw }
    }

    /// The beacon the announcer sends: the bare announce payload, no MAC line.
    pub fn announce() -> Self {
        Self::new(ANNOUNCE_PAYLOAD, None)
    }

    pub fn encode(&self) -> Vec<u8> {
        match &self.mac {
            Some(mac) => format!("{}\n{}", self.name, mac).into_bytes(),
            None => self.name.clone().into_bytes(),
        }
    }

    /// Decode a received payload. Never fails: undecodable bytes are replaced
    /// and a missing second line leaves the MAC absent.
    pub fn decode(payload: &[u8]) -> Self {
        let (name, mac) = address::split_beacon(payload);
        let raw = String::from_utf8_lossy(payload).into_owned();
        Self { name, mac, raw }
    }

    /// Registry key of the sender: name and MAC, or the whole payload text
    /// when no MAC was sent.
    pub fn identity(&self) -> String {
        match &self.mac {
            Some(mac) => device_key(&self.name, Some(mac)),
            None => self.raw.clone(),
        }
    }

    pub fn mac_or_unknown(&self) -> String {
        self.mac.clone().unwrap_or_else(|| UNKNOWN_MAC.to_string())
    }
}
