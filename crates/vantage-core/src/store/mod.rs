// ── Entity storage ──
//
// Reactive per-entry cache of objects, entities, and devices.

mod collection;
mod entity_store;
mod stream;

pub use collection::Snapshot;
pub use entity_store::{EntityStore, ReconcileReport, UpdateOutcome};
pub use stream::EntityStream;
