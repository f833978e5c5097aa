use std::collections::{BTreeMap, HashMap};
use chrono::{DateTime, Utc};
use shared::types::{Client, Device, Entity, EntityKind, NetworkService, Snapshot, Status};

/// What a `for_each_entity` visitor wants done with the entry it was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityAction {
    Keep,
    SetStatus(Status),
    Remove,
}

/// A fresh sighting handed to the registry by one of the producers.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Client(Client),
    NetworkService(NetworkService),
    Device(Device),
}

impl Observation {
    pub fn kind(&self) -> EntityKind {
        self.entity().kind()
    }

    pub fn key(&self) -> String {
        self.entity().key()
    }

    pub fn entity(&self) -> &dyn Entity {
        match self {
            Observation::Client(c) => c,
            Observation::NetworkService(s) => s,
            Observation::Device(d) => d,
        }
    }
}

/// Result of an upsert: the stored `last_seen` and whether anything a
/// reader could observe changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub last_seen: DateTime<Utc>,
    pub changed: bool,
}

/// One keyed table of entities of a single kind.
#[derive(Debug)]
pub struct Table<T> {
    entries: HashMap<String, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Entity + Clone + PartialEq> Table<T> {
    /// Insert or refresh `key`. The entity is always stored as visible and
    /// its `last_seen` never moves backward.
    pub fn upsert(&mut self, key: String, mut entity: T, now: DateTime<Utc>) -> UpsertOutcome {
        entity.set_status(Status::Visible);

        let changed = match self.entries.get(&key) {
            Some(old) => {
                entity.set_last_seen(now.max(old.last_seen()));
                entity_data_changed(old, &entity)
            }
            None => {
                entity.set_last_seen(now);
                true
            }
        };

        let last_seen = entity.last_seen();
        self.entries.insert(key, entity);

        UpsertOutcome { last_seen, changed }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if any entry changed status or was removed.
    fn apply<F>(&mut self, f: &mut F) -> bool
    where
        F: FnMut(&str, &dyn Entity) -> EntityAction,
    {
        let mut changed = false;

        self.entries.retain(|key, entity| match f(key.as_str(), &*entity) {
            EntityAction::Keep => true,
            EntityAction::SetStatus(status) => {
                if entity.status() != status {
                    entity.set_status(status);
                    changed = true;
                }
                true
            }
            EntityAction::Remove => {
                changed = true;
                false
            }
        });

        changed
    }

    fn snapshot(&self) -> BTreeMap<String, T> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// The in-memory registry: one table per entity kind so keys of different
/// kinds can never collide.
#[derive(Debug, Default)]
pub struct Store {
    clients: Table<Client>,
    network_services: Table<NetworkService>,
    devices: Table<Device>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, key: String, observation: Observation, now: DateTime<Utc>) -> UpsertOutcome {
        match observation {
            Observation::Client(c) => self.clients.upsert(key, c, now),
            Observation::NetworkService(s) => self.network_services.upsert(key, s, now),
            Observation::Device(d) => self.devices.upsert(key, d, now),
        }
    }

    pub fn get(&self, kind: EntityKind, key: &str) -> Option<Observation> {
        match kind {
            EntityKind::Client => self.clients.get(key).cloned().map(Observation::Client),
            EntityKind::NetworkService => self
                .network_services
                .get(key)
                .cloned()
                .map(Observation::NetworkService),
            EntityKind::Device => self.devices.get(key).cloned().map(Observation::Device),
        }
    }

    /// Returns true if an entry was removed.
    pub fn remove(&mut self, kind: EntityKind, key: &str) -> bool {
        match kind {
            EntityKind::Client => self.clients.remove(key).is_some(),
            EntityKind::NetworkService => self.network_services.remove(key).is_some(),
            EntityKind::Device => self.devices.remove(key).is_some(),
        }
    }

    /// Visit every entry of every table and apply the action the visitor
    /// returns. Returns true if anything changed.
    pub fn for_each_entity<F>(&mut self, mut f: F) -> bool
    where
        F: FnMut(EntityKind, &str, &dyn Entity) -> EntityAction,
    {
        let clients = self
            .clients
            .apply(&mut |key: &str, e: &dyn Entity| f(EntityKind::Client, key, e));
        let services = self
            .network_services
            .apply(&mut |key: &str, e: &dyn Entity| f(EntityKind::NetworkService, key, e));
        let devices = self
            .devices
            .apply(&mut |key: &str, e: &dyn Entity| f(EntityKind::Device, key, e));

        clients || services || devices
    }

    pub fn len(&self) -> usize {
        self.clients.len() + self.network_services.len() + self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            clients: self.clients.snapshot(),
            network_services: self.network_services.snapshot(),
            devices: self.devices.snapshot(),
        }
    }
}

/// Compare every field a reader sees; `last_seen` alone is not a change.
fn entity_data_changed<T: Entity + Clone + PartialEq>(old: &T, new: &T) -> bool {
    let mut old = old.clone();
    old.set_last_seen(new.last_seen());
    old != *new
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_device(name: &str) -> Device {
        Device::new(
            name.to_string(),
            "192.168.1.7:5000".to_string(),
            "08-00-27-DC-4A-9E".to_string(),
        )
    }

    fn test_client(address: &str) -> Client {
        Client::new(
            "host".to_string(),
            address.to_string(),
            "unknown".to_string(),
            "eth0".to_string(),
        )
    }

    fn upsert(store: &mut Store, observation: Observation, now: DateTime<Utc>) -> UpsertOutcome {
        let key = observation.key();
        store.upsert(key, observation, now)
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut store = Store::new();
        let now = Utc::now();

        let first = upsert(&mut store, Observation::Device(test_device("Alice")), now);
        assert!(first.changed, "First insert should report change");

        let second = upsert(
            &mut store,
            Observation::Device(test_device("Alice")),
            now + Duration::seconds(3),
        );
        assert!(!second.changed, "Refresh should not report change");
        assert_eq!(store.len(), 1);
        assert_eq!(second.last_seen, now + Duration::seconds(3));
    }

    #[test]
    fn test_last_seen_never_moves_backward() {
        let mut store = Store::new();
        let now = Utc::now();

        upsert(&mut store, Observation::Client(test_client("10.0.0.2")), now);
        let outcome = upsert(
            &mut store,
            Observation::Client(test_client("10.0.0.2")),
            now - Duration::seconds(5),
        );

        assert_eq!(outcome.last_seen, now);
        let Some(Observation::Client(stored)) = store.get(EntityKind::Client, "10.0.0.2") else {
            panic!("client missing");
        };
        assert_eq!(stored.last_seen, now);
    }

    #[test]
    fn test_upsert_resets_status_to_visible() {
        let mut store = Store::new();
        let now = Utc::now();

        upsert(&mut store, Observation::Device(test_device("Alice")), now);
        store.for_each_entity(|_, _, _| EntityAction::SetStatus(Status::Gone));

        let outcome = upsert(&mut store, Observation::Device(test_device("Alice")), now);
        assert!(outcome.changed, "Gone to visible is a change");

        let Some(Observation::Device(stored)) = store.get(EntityKind::Device, "Alice\n08-00-27-DC-4A-9E") else {
            panic!("device missing");
        };
        assert_eq!(stored.status, Status::Visible);
    }

    #[test]
    fn test_tables_do_not_collide() {
        let mut store = Store::new();
        let now = Utc::now();

        let client = test_client("1");
        let service = NetworkService::new(
            "lo".to_string(),
            "[127.0.0.1]".to_string(),
            "unknown".to_string(),
            "1".to_string(),
            None,
            "lo".to_string(),
        );

        store.upsert("1".to_string(), Observation::Client(client), now);
        store.upsert("1".to_string(), Observation::NetworkService(service), now);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.clients.len(), 1);
        assert_eq!(snapshot.network_services.len(), 1);
    }

    #[test]
    fn test_for_each_entity_actions() {
        let mut store = Store::new();
        let now = Utc::now();

        upsert(&mut store, Observation::Device(test_device("keep")), now);
        upsert(&mut store, Observation::Device(test_device("hide")), now);
        upsert(&mut store, Observation::Device(test_device("drop")), now);

        let changed = store.for_each_entity(|kind, _key, entity| {
            assert_eq!(kind, EntityKind::Device);
            match entity.name() {
                "hide" => EntityAction::SetStatus(Status::Invisible),
                "drop" => EntityAction::Remove,
                _ => EntityAction::Keep,
            }
        });

        assert!(changed);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.devices.len(), 2);
        assert_eq!(snapshot.devices["hide\n08-00-27-DC-4A-9E"].status, Status::Invisible);
        assert_eq!(snapshot.devices["keep\n08-00-27-DC-4A-9E"].status, Status::Visible);

        let unchanged = store.for_each_entity(|_, _, _| EntityAction::Keep);
        assert!(!unchanged);
    }

    #[test]
    fn test_interface_details_are_a_change() {
        let mut store = Store::new();
        let now = Utc::now();
        let service = |mtu, display_name: &str| {
            NetworkService::new(
                "eth0".to_string(),
                "[fe80::a00:27ff:fedc:4a9e]".to_string(),
                "08-00-27-DC-4A-9E".to_string(),
                "2".to_string(),
                mtu,
                display_name.to_string(),
            )
        };

        upsert(&mut store, Observation::NetworkService(service(Some(1500), "eth0")), now);

        let jumbo = upsert(&mut store, Observation::NetworkService(service(Some(9000), "eth0")), now);
        assert!(jumbo.changed, "MTU change should be reported");

        let renamed = upsert(
            &mut store,
            Observation::NetworkService(service(Some(9000), "Intel PRO/1000")),
            now,
        );
        assert!(renamed.changed, "Display name change should be reported");

        let refresh = upsert(
            &mut store,
            Observation::NetworkService(service(Some(9000), "Intel PRO/1000")),
            now + Duration::seconds(5),
        );
        assert!(!refresh.changed);
    }

    #[test]
    fn test_client_interface_move_is_a_change() {
        let mut store = Store::new();
        let now = Utc::now();

        upsert(&mut store, Observation::Client(test_client("10.0.0.2")), now);

        let mut moved = test_client("10.0.0.2");
        moved.interface_name = "wlan0".to_string();
        let outcome = upsert(&mut store, Observation::Client(moved), now);
        assert!(outcome.changed);
    }

    #[test]
    fn test_remove() {
        let mut store = Store::new();
        upsert(&mut store, Observation::Client(test_client("10.0.0.2")), Utc::now());

        assert!(store.remove(EntityKind::Client, "10.0.0.2"));
        assert!(!store.remove(EntityKind::Client, "10.0.0.2"));
        assert!(store.is_empty());
    }
}
