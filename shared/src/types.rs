use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound (inclusive) of the age, in milliseconds, at which an entity is still visible.
pub const VISIBLE_UNTIL_MS: i64 = 10_000;

/// Upper bound (inclusive) of the invisible window.
pub const INVISIBLE_UNTIL_MS: i64 = 25_000;

/// Upper bound (inclusive) of the gone window. Anything older is evicted.
pub const GONE_UNTIL_MS: i64 = 40_000;

/// Liveness of a tracked entity, ordered from most to least alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Visible,
    Invisible,
    Gone,
}

impl Status {
    /// Classify an entity last seen `age_ms` milliseconds ago.
    ///
    /// Returns `None` once the entity has expired and must be removed.
    /// A non-positive age (refreshed in the same instant as the sweep, or
    /// clock skew) counts as visible.
    pub fn for_age(age_ms: i64) -> Option<Status> {
        if age_ms <= VISIBLE_UNTIL_MS {
            Some(Status::Visible)
        } else if age_ms <= INVISIBLE_UNTIL_MS {
            Some(Status::Invisible)
        } else if age_ms <= GONE_UNTIL_MS {
            Some(Status::Gone)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Visible => "VISIBLE",
            Status::Invisible => "INVISIBLE",
            Status::Gone => "GONE",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VISIBLE" => Ok(Status::Visible),
            "INVISIBLE" => Ok(Status::Invisible),
            "GONE" => Ok(Status::Gone),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Which registry table an entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    NetworkService,
    Device,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Client => "client",
            EntityKind::NetworkService => "network_service",
            EntityKind::Device => "device",
        }
    }
}

/// Common view over every discoverable unit tracked by the registry.
pub trait Entity {
    fn kind(&self) -> EntityKind;

    /// Identity key, unique within the entity's table.
    fn key(&self) -> String;

    fn name(&self) -> &str;
    fn address(&self) -> &str;
    fn mac(&self) -> &str;
    fn status(&self) -> Status;
    fn last_seen(&self) -> DateTime<Utc>;
    fn set_status(&mut self, status: Status);
    fn set_last_seen(&mut self, at: DateTime<Utc>);
}

macro_rules! impl_entity {
    ($ty:ty, $kind:expr, |$this:ident| $key:expr) => {
        impl Entity for $ty {
            fn kind(&self) -> EntityKind {
                $kind
            }

            fn key(&self) -> String {
                let $this = self;
                $key
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn address(&self) -> &str {
                &self.address
            }

            fn mac(&self) -> &str {
                &self.mac
            }

            fn status(&self) -> Status {
                self.status
            }

            fn last_seen(&self) -> DateTime<Utc> {
                self.last_seen
            }

            fn set_status(&mut self, status: Status) {
                self.status = status;
            }

            fn set_last_seen(&mut self, at: DateTime<Utc>) {
                self.last_seen = at;
            }
        }
    };
}

/// A locally bound address found through interface enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub name: String,

    /// Host address, e.g. "192.168.1.20"
    pub address: String,

    /// Hardware address of the owning adapter, or "unknown"
    pub mac: String,

    /// Display name of the interface the address is bound to
    pub interface_name: String,

    pub status: Status,
    pub last_seen: DateTime<Utc>,
}

impl Client {
    pub fn new(name: String, address: String, mac: String, interface_name: String) -> Self {
        Self {
            name,
            address,
            mac,
            interface_name,
            status: Status::Visible,
            last_seen: Utc::now(),
        }
    }
}

impl_entity!(Client, EntityKind::Client, |this| this.address.clone());

/// A local network interface surfaced because it only carries loopback or
/// link-local addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkService {
    /// Interface name, e.g. "lo" or "eth0"
    pub name: String,

    /// All addresses bound to the interface
    pub address: String,

    pub mac: String,

    /// OS interface index
    pub index: String,

    /// MTU in bytes, when the platform exposes it
    pub mtu: Option<u32>,

    pub display_name: String,

    pub status: Status,
    pub last_seen: DateTime<Utc>,
}

impl NetworkService {
    pub fn new(
        name: String,
        address: String,
        mac: String,
        index: String,
        mtu: Option<u32>,
        display_name: String,
    ) -> Self {
        Self {
            name,
            address,
            mac,
            index,
            mtu,
            display_name,
            status: Status::Visible,
            last_seen: Utc::now(),
        }
    }
}

impl_entity!(NetworkService, EntityKind::NetworkService, |this| this.index.clone());

/// A remote peer announcing itself on the multicast group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Registry key: name and MAC, or the raw payload text without a MAC
    pub identity: String,

    pub name: String,

    /// Sender socket address, e.g. "192.168.1.7:5000"
    pub address: String,

    pub mac: String,

    pub status: Status,
    pub last_seen: DateTime<Utc>,
}

impl Device {
    pub fn new(name: String, address: String, mac: String) -> Self {
        let known = (mac != crate::protocol::UNKNOWN_MAC).then_some(mac.as_str());
        let identity = device_key(&name, known);
        Self::with_identity(identity, name, address, mac)
    }

    pub fn with_identity(identity: String, name: String, address: String, mac: String) -> Self {
        Self {
            identity,
            name,
            address,
            mac,
            status: Status::Visible,
            last_seen: Utc::now(),
        }
    }
}

impl_entity!(Device, EntityKind::Device, |this| this.identity.clone());

/// Read-only copy of the three registry tables, keyed by identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub clients: BTreeMap<String, Client>,
    pub network_services: BTreeMap<String, NetworkService>,
    pub devices: BTreeMap<String, Device>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.clients.len() + self.network_services.len() + self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identity of a beacon sender: name and MAC joined by the wire's line
/// separator, or the name alone. A name line never contains `\n`, so the two
/// forms cannot collide.
pub fn device_key(name: &str, mac: Option<&str>) -> String {
    match mac {
        Some(mac) => format!("{}\n{}", name, mac),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_boundaries() {
        let cases = [
            (0, Some(Status::Visible)),
            (1, Some(Status::Visible)),
            (10_000, Some(Status::Visible)),
            (10_001, Some(Status::Invisible)),
            (25_000, Some(Status::Invisible)),
            (25_001, Some(Status::Gone)),
            (40_000, Some(Status::Gone)),
            (40_001, None),
        ];

        for (age, expected) in cases {
            assert_eq!(Status::for_age(age), expected, "age {} ms", age);
        }
    }

    #[test]
    fn test_negative_age_is_visible() {
        assert_eq!(Status::for_age(-250), Some(Status::Visible));
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&Status::Invisible).unwrap();
        assert_eq!(json, "\"INVISIBLE\"");
        assert_eq!("gone".parse::<Status>().unwrap(), Status::Gone);
        assert!("removed".parse::<Status>().is_err());
    }

    #[test]
    fn test_entity_keys() {
        let client = Client::new(
            "host".to_string(),
            "192.168.1.20".to_string(),
            "08-00-27-DC-4A-9E".to_string(),
            "eth0".to_string(),
        );
        assert_eq!(client.key(), "192.168.1.20");

        let service = NetworkService::new(
            "lo".to_string(),
            "[127.0.0.1, ::1]".to_string(),
            "unknown".to_string(),
            "1".to_string(),
            Some(65536),
            "lo".to_string(),
        );
        assert_eq!(service.key(), "1");

        let device = Device::new(
            "Alice".to_string(),
            "192.168.1.7:5000".to_string(),
            "08-00-27-DC-4A-9E".to_string(),
        );
        assert_eq!(device.key(), "Alice\n08-00-27-DC-4A-9E");

        let anonymous = Device::new(
            "discovering".to_string(),
            "192.168.1.8:5000".to_string(),
            "unknown".to_string(),
        );
        assert_eq!(anonymous.key(), "discovering");
    }

    #[test]
    fn test_device_key_forms_do_not_collide() {
        let with_mac = device_key("Alice", Some("08-00-27-DC-4A-9E"));
        let odd_name = device_key("Alice@08-00-27-DC-4A-9E", None);
        assert_ne!(with_mac, odd_name);

        let spaced = device_key("Alice 08-00-27-DC-4A-9E", None);
        assert_ne!(with_mac, spaced);
    }
}
