//! Time-windowed liveness: every entity's status is re-derived from how long
//! ago it was last seen, and entities past the gone window are evicted.

use std::time::Duration;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use shared::types::{Entity, Status};
use crate::registry::store::{EntityAction, Store};
use crate::registry_manager::RegistryHandle;

/// Outcome of one sweep pass. Counts are of entries left after the pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub visible: usize,
    pub invisible: usize,
    pub gone: usize,
    pub removed: usize,
    pub changed: bool,
}

/// The action the sweep takes for an entity, given the time of the sweep.
pub fn action_for(entity: &dyn Entity, now: DateTime<Utc>) -> EntityAction {
    let age_ms = (now - entity.last_seen()).num_milliseconds();

    match Status::for_age(age_ms) {
        Some(status) if status == entity.status() => EntityAction::Keep,
        Some(status) => EntityAction::SetStatus(status),
        None => EntityAction::Remove,
    }
}

/// One sweep pass over the whole store. Never touches `last_seen`.
pub fn sweep(store: &mut Store, now: DateTime<Utc>) -> SweepReport {
    let mut report = SweepReport::default();

    let changed = store.for_each_entity(|_kind, _key, entity| {
        let action = action_for(entity, now);
        let status = match action {
            EntityAction::Keep => Some(entity.status()),
            EntityAction::SetStatus(status) => Some(status),
            EntityAction::Remove => None,
        };
        match status {
            Some(Status::Visible) => report.visible += 1,
            Some(Status::Invisible) => report.invisible += 1,
            Some(Status::Gone) => report.gone += 1,
            None => report.removed += 1,
        }
        action
    });
    report.changed = changed;

    report
}

/// Sweeper loop - reclassifies the registry every `interval` until cancelled
pub async fn run(
    registry: RegistryHandle,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!("Starting liveness sweeper every {:?}", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match registry.sweep(Utc::now()).await {
                    Ok(report) if report.changed => {
                        tracing::debug!(
                            "Sweep: {} visible, {} invisible, {} gone, {} removed",
                            report.visible,
                            report.invisible,
                            report.gone,
                            report.removed
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Failed to run liveness sweep: {}", e);
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Liveness sweeper shutting down");
                break;
            }
        }
    }

    Ok(())
}
