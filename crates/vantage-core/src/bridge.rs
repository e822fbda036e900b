// ── Entity bridge loop ──
//
// Applies link events to an entry's store. Availability transitions are
// logged once per transition, never once per notification: a flapping
// connection produces one line per change of state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vantage_link::LinkEvent;

use crate::store::EntityStore;

/// Counters the bridge keeps for observability and tests.
#[derive(Debug, Default)]
pub struct BridgeStats {
    transitions: AtomicU64,
    notifications: AtomicU64,
}

impl BridgeStats {
    /// Logged availability transitions, connection-level and per-entity.
    pub fn availability_transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    /// Link events applied to the store.
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    pub(crate) fn record_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }
}

/// Apply one link event to `store`.
pub(crate) fn apply(
    entry_id: &str,
    event: &LinkEvent,
    store: &EntityStore,
    stats: &BridgeStats,
    stale_grace: Duration,
) {
    stats.notifications.fetch_add(1, Ordering::Relaxed);
    let now = Utc::now();

    match event {
        LinkEvent::ObjectUpdated { vid, changes } => {
            let outcome = store.apply_update(*vid, changes);
            if !outcome.known {
                debug!(entry_id, %vid, "update for unknown object ignored");
            } else if outcome.restored {
                stats.record_transition();
                info!(entry_id, %vid, "object reachable again");
            }
        }
        LinkEvent::ObjectAdded { object } => {
            let vid = object.vid;
            match store.insert_object(object.clone()) {
                Some(entity) => info!(entry_id, %vid, entity = %entity.entity_id(), "new object added"),
                None => debug!(entry_id, %vid, "new non-entity object added"),
            }
        }
        LinkEvent::ObjectDeleted { vid } => {
            if store.mark_deleted(*vid, now) {
                info!(entry_id, %vid, grace = ?stale_grace, "object deleted; entity is stale");
            }
            sweep(entry_id, store, stale_grace);
        }
        LinkEvent::ObjectUnreachable { vid } => {
            if store.mark_unreachable(*vid) {
                stats.record_transition();
                warn!(entry_id, %vid, "object unreachable");
            }
        }
        LinkEvent::Disconnected { reason } => {
            if store.set_connected(false) {
                stats.record_transition();
                warn!(entry_id, %reason, "controller unavailable");
            }
        }
        LinkEvent::Reconnected { objects } => {
            let report = store.reconcile(objects.clone(), now);
            if store.set_connected(true) {
                stats.record_transition();
                info!(entry_id, "controller available again");
            }
            if !report.added.is_empty() || !report.stale.is_empty() || !report.restored.is_empty() {
                info!(
                    entry_id,
                    added = report.added.len(),
                    stale = report.stale.len(),
                    restored = report.restored.len(),
                    "object directory changed while disconnected"
                );
            }
            sweep(entry_id, store, stale_grace);
        }
    }
}

fn sweep(entry_id: &str, store: &EntityStore, grace: Duration) {
    for entity in store.sweep(Utc::now(), grace) {
        info!(entry_id, vid = %entity.vid, entity = %entity.entity_id(), "removed stale entity");
    }
}

/// Consume link events for one entry until cancelled or the link goes away.
pub(crate) async fn bridge_task(
    entry_id: String,
    mut rx: broadcast::Receiver<Arc<LinkEvent>>,
    store: Arc<EntityStore>,
    stats: Arc<BridgeStats>,
    stale_grace: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Ok(event) => apply(&entry_id, &event, &store, &stats, stale_grace),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(entry_id, skipped, "entity bridge lagged; cached state may be behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!(entry_id, "entity bridge stopped");
}

/// Periodically drop stale entities whose grace period has run out.
pub(crate) async fn sweep_task(
    entry_id: String,
    store: Arc<EntityStore>,
    stale_grace: Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    // `interval` panics on a zero period.
    let mut interval = tokio::time::interval(every.max(Duration::from_millis(10)));
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => sweep(&entry_id, &store, stale_grace),
        }
    }
}
