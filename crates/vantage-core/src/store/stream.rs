// ── Entity streams ──
//
// Subscription handle over the entity snapshot, optionally narrowed to
// one platform.

use std::sync::Arc;

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::collection::Snapshot;
use crate::model::{Entity, Platform};

/// A subscription to a runtime's entities.
///
/// Gives point-in-time access to the snapshot and reactive change
/// notification through [`changed`](Self::changed) or as a `Stream`.
pub struct EntityStream {
    current: Snapshot<Entity>,
    receiver: watch::Receiver<Snapshot<Entity>>,
    platform: Option<Platform>,
}

impl EntityStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot<Entity>>) -> Self {
        let current = receiver.borrow().clone();
        Self {
            current,
            receiver,
            platform: None,
        }
    }

    /// Only yield entities on `platform`.
    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self.current = narrow(&self.current, self.platform);
        self
    }

    /// The snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Snapshot<Entity> {
        &self.current
    }

    /// The latest snapshot, which may be newer than `current()`.
    pub fn latest(&self) -> Snapshot<Entity> {
        narrow(&self.receiver.borrow(), self.platform)
    }

    /// Wait for the next change. `None` once the store is dropped.
    pub async fn changed(&mut self) -> Option<Snapshot<Entity>> {
        self.receiver.changed().await.ok()?;
        let snap = narrow(&self.receiver.borrow_and_update(), self.platform);
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Convert into a `Stream` for `StreamExt` combinators. The first item
    /// is the current snapshot.
    pub fn into_stream(self) -> impl Stream<Item = Snapshot<Entity>> + Send + Unpin {
        let platform = self.platform;
        WatchStream::new(self.receiver).map(move |snap| narrow(&snap, platform))
    }
}

fn narrow(snap: &Snapshot<Entity>, platform: Option<Platform>) -> Snapshot<Entity> {
    match platform {
        None => Arc::clone(snap),
        Some(platform) => Arc::new(
            snap.iter()
                .filter(|e| e.platform() == platform)
                .cloned()
                .collect(),
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;
    use vantage_link::{ObjectState, ObjectType, SystemObject, Vid};

    use crate::model::Platform;
    use crate::store::EntityStore;

    fn store() -> EntityStore {
        let store = EntityStore::new();
        store.load(vec![
            SystemObject::new(1, "Pendants", ObjectType::Load),
            SystemObject::new(2, "Door", ObjectType::DryContact),
        ]);
        store
    }

    #[tokio::test]
    async fn platform_filter_narrows_snapshots() {
        let store = store();
        let mut lights = store.subscribe_entities().platform(Platform::Light);
        assert_eq!(lights.current().len(), 1);

        store.apply_update(
            Vid(1),
            &ObjectState {
                level: Some(100.0),
                ..ObjectState::default()
            },
        );
        let snap = lights.changed().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].vid, Vid(1));
        assert_eq!(store.subscribe_entities().latest().len(), 2);
    }

    #[tokio::test]
    async fn stream_yields_current_first() {
        let store = store();
        let mut stream = store
            .subscribe_entities()
            .platform(Platform::BinarySensor)
            .into_stream();
        let first = stream.next().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].vid, Vid(2));
    }
}
