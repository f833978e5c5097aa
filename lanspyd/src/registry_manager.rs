use std::thread;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use anyhow::Result;
use shared::types::{Entity, EntityKind, Snapshot};
use crate::liveness::{self, SweepReport};
use crate::registry::hash;
use crate::registry::store::{EntityAction, Observation, Store, UpsertOutcome};

/// Visitor run inside the registry thread against every entry.
pub type EntityVisitor = Box<dyn FnMut(EntityKind, &str, &dyn Entity) -> EntityAction + Send + Sync>;

/// Commands sent to the registry thread
pub enum RegistryCommand {
    Upsert(String, Observation, oneshot::Sender<UpsertOutcome>),
    Remove(EntityKind, String, oneshot::Sender<bool>),
    Get(EntityKind, String, oneshot::Sender<Option<Observation>>),
    Snapshot(oneshot::Sender<Snapshot>),
    ForEach(EntityVisitor, oneshot::Sender<bool>),
    Sweep {
        now: DateTime<Utc>,
        reply: oneshot::Sender<SweepReport>,
    },
    Shutdown,
}

/// Handle to the registry. Cheap to clone; every producer and the sweeper
/// holds its own.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn the registry thread owning `store`. Every change a reader could
    /// observe republishes the store fingerprint on `hash_tx`.
    pub fn spawn(mut store: Store, hash_tx: watch::Sender<String>) -> Self {
        let (tx, mut rx) = mpsc::channel::<RegistryCommand>(256);

        let republish = |store: &Store, hash_tx: &watch::Sender<String>| {
            let new_hash = hash::compute_hash(&store.snapshot());
            hash_tx.send_if_modified(|current| {
                if *current == new_hash {
                    false
                } else {
                    *current = new_hash;
                    true
                }
            });
        };

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    RegistryCommand::Upsert(key, observation, reply) => {
                        // Stamped here so the order of stamps matches the order of writes
                        let outcome = store.upsert(key, observation, Utc::now());
                        if outcome.changed {
                            republish(&store, &hash_tx);
                        }
                        let _ = reply.send(outcome);
                    }
                    RegistryCommand::Remove(kind, key, reply) => {
                        let removed = store.remove(kind, &key);
                        if removed {
                            republish(&store, &hash_tx);
                        }
                        let _ = reply.send(removed);
                    }
                    RegistryCommand::Get(kind, key, reply) => {
                        let _ = reply.send(store.get(kind, &key));
                    }
                    RegistryCommand::Snapshot(reply) => {
                        let _ = reply.send(store.snapshot());
                    }
                    RegistryCommand::ForEach(mut visitor, reply) => {
                        let changed = store.for_each_entity(|kind, key, entity| visitor(kind, key, entity));
                        if changed {
                            republish(&store, &hash_tx);
                        }
                        let _ = reply.send(changed);
                    }
                    RegistryCommand::Sweep { now, reply } => {
                        let report = liveness::sweep(&mut store, now);
                        if report.changed {
                            republish(&store, &hash_tx);
                        }
                        let _ = reply.send(report);
                    }
                    RegistryCommand::Shutdown => {
                        tracing::info!("Registry thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Insert or refresh an entity under its identity key. Returns the stored `last_seen`.
    pub async fn upsert(&self, observation: Observation) -> Result<UpsertOutcome> {
        let key = observation.key();
        self.upsert_with_key(key, observation).await
    }

    /// Insert or refresh an entity under an explicit key
    pub async fn upsert_with_key(&self, key: String, observation: Observation) -> Result<UpsertOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Upsert(key, observation, reply)).await?;
        Ok(rx.await?)
    }

    /// Remove an entity. Returns true if it was present.
    pub async fn remove(&self, kind: EntityKind, key: String) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Remove(kind, key, reply)).await?;
        Ok(rx.await?)
    }

    /// Get a single entity by kind and key
    pub async fn get(&self, kind: EntityKind, key: String) -> Result<Option<Observation>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Get(kind, key, reply)).await?;
        Ok(rx.await?)
    }

    /// Copy of all three tables
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Snapshot(reply)).await?;
        Ok(rx.await?)
    }

    /// Run `visitor` against every entry, applying the action it returns.
    /// Returns true if anything changed.
    pub async fn for_each_entity<F>(&self, visitor: F) -> Result<bool>
    where
        F: FnMut(EntityKind, &str, &dyn Entity) -> EntityAction + Send + Sync + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::ForEach(Box::new(visitor), reply)).await?;
        Ok(rx.await?)
    }

    /// Reclassify every entry by its age at `now`, evicting expired ones
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Sweep { now, reply }).await?;
        Ok(rx.await?)
    }

    /// Shutdown the registry thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(RegistryCommand::Shutdown).await?;
        Ok(())
    }
}
