use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::types::{Entity, EntityKind, Snapshot};

/// Every field of an entity except `last_seen`: it moves on every sighting,
/// but a refresh alone is not something a reader needs to re-fetch for.
#[derive(Serialize)]
struct HashView<'a> {
    kind: EntityKind,
    key: &'a str,
    entity: serde_json::Value,
}

fn view<'a, T>(kind: EntityKind, key: &'a str, entity: &T) -> serde_json::Result<HashView<'a>>
where
    T: Entity + Clone + Serialize,
{
    let mut stable = entity.clone();
    stable.set_last_seen(DateTime::<Utc>::default());

    Ok(HashView {
        kind,
        key,
        entity: serde_json::to_value(&stable)?,
    })
}

/// Computes a SHA-256 fingerprint of a registry snapshot.
/// Tables are visited in a fixed order and each is already sorted by key, so
/// the output is deterministic.
pub fn compute_hash(snapshot: &Snapshot) -> String {
    let views: Vec<HashView<'_>> = snapshot
        .clients
        .iter()
        .map(|(k, v)| view(EntityKind::Client, k, v))
        .chain(
            snapshot
                .network_services
                .iter()
                .map(|(k, v)| view(EntityKind::NetworkService, k, v)),
        )
        .chain(
            snapshot
                .devices
                .iter()
                .map(|(k, v)| view(EntityKind::Device, k, v)),
        )
        .collect::<serde_json::Result<_>>()
        .expect("Failed to serialize registry for hashing");

    let json = serde_json::to_string(&views)
        .expect("Failed to serialize registry for hashing");

    let hash = Sha256::digest(json.as_bytes());
    hex::encode(hash)
}
