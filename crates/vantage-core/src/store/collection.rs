// ── Reactive keyed collection ──
//
// Concurrent storage with O(1) lookups and push-based change
// notification via `watch` channels. Snapshots are ordered by key.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// An ordered, shareable view of a collection.
pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// A reactive collection of one record type, keyed by `K`.
///
/// Every mutation republishes the ordered snapshot that subscribers
/// receive. Batch mutations publish once.
pub(crate) struct Collection<K, T>
where
    K: Eq + Hash + Ord + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    by_key: DashMap<K, Arc<T>>,
    snapshot: watch::Sender<Snapshot<T>>,
}

impl<K, T> Collection<K, T>
where
    K: Eq + Hash + Ord + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_key: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace a record. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: K, record: T) -> bool {
        let is_new = self.by_key.insert(key, Arc::new(record)).is_none();
        self.publish();
        is_new
    }

    /// Insert or replace many records, publishing once. Returns how many
    /// keys were new.
    pub(crate) fn upsert_many(&self, records: impl IntoIterator<Item = (K, T)>) -> usize {
        let mut added = 0;
        let mut touched = false;
        for (key, record) in records {
            touched = true;
            if self.by_key.insert(key, Arc::new(record)).is_none() {
                added += 1;
            }
        }
        if touched {
            self.publish();
        }
        added
    }

    /// Hold exactly `records` afterwards, publishing once. Keys present
    /// before and after stay readable throughout.
    pub(crate) fn replace_all(&self, records: impl IntoIterator<Item = (K, T)>) {
        let mut keep = HashSet::new();
        for (key, record) in records {
            keep.insert(key.clone());
            self.by_key.insert(key, Arc::new(record));
        }
        self.by_key.retain(|key, _| keep.contains(key));
        self.publish();
    }

    /// Remove every record for which `f` returns `true`, publishing once.
    pub(crate) fn remove_where(&self, mut f: impl FnMut(&T) -> bool) -> Vec<Arc<T>> {
        let doomed: Vec<K> = self
            .by_key
            .iter()
            .filter(|r| f(r.value()))
            .map(|r| r.key().clone())
            .collect();
        let removed: Vec<Arc<T>> = doomed
            .iter()
            .filter_map(|k| self.by_key.remove(k).map(|(_, v)| v))
            .collect();
        if !removed.is_empty() {
            self.publish();
        }
        removed
    }

    pub(crate) fn get(&self, key: &K) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Modify one record in place. `f` returns whether it changed
    /// anything; unchanged records are not republished.
    ///
    /// Returns `None` when `key` is absent.
    pub(crate) fn update(&self, key: &K, f: impl FnOnce(&mut T) -> bool) -> Option<bool> {
        let changed = {
            let mut entry = self.by_key.get_mut(key)?;
            let mut record = T::clone(entry.value());
            let changed = f(&mut record);
            if changed {
                *entry.value_mut() = Arc::new(record);
            }
            changed
        };
        if changed {
            self.publish();
        }
        Some(changed)
    }

    /// Modify every record, publishing once. Returns how many changed.
    pub(crate) fn update_all(&self, mut f: impl FnMut(&mut T) -> bool) -> usize {
        let mut changed = 0;
        for mut entry in self.by_key.iter_mut() {
            let mut record = T::clone(entry.value());
            if f(&mut record) {
                *entry.value_mut() = Arc::new(record);
                changed += 1;
            }
        }
        if changed > 0 {
            self.publish();
        }
        changed
    }

    /// Current ordered snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Snapshot<T> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn publish(&self) {
        let mut entries: Vec<(K, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values: Vec<Arc<T>> = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn keys<T: Clone + Send + Sync + 'static>(col: &Collection<u32, T>) -> Vec<u32> {
        let mut keys: Vec<u32> = col.by_key.iter().map(|r| *r.key()).collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn upsert_reports_new_keys() {
        let col: Collection<u32, String> = Collection::new();
        assert!(col.upsert(1, "a".into()));
        assert!(!col.upsert(1, "b".into()));
        assert_eq!(*col.get(&1).unwrap(), "b");
    }

    #[test]
    fn snapshot_is_ordered_by_key() {
        let col: Collection<u32, String> = Collection::new();
        col.upsert(30, "c".into());
        col.upsert(4, "a".into());
        col.upsert(12, "b".into());
        let snap: Vec<String> = col.snapshot().iter().map(|s| s.to_string()).collect();
        assert_eq!(snap, vec!["a", "b", "c"]);
        assert_eq!(keys(&col), vec![4, 12, 30]);
    }

    #[test]
    fn unchanged_update_does_not_publish() {
        let col: Collection<u32, String> = Collection::new();
        col.upsert(1, "a".into());
        let mut rx = col.subscribe();
        rx.borrow_and_update();

        assert_eq!(col.update(&1, |_| false), Some(false));
        assert!(!rx.has_changed().unwrap());

        assert_eq!(col.update(&1, |s| {
            s.push('!');
            true
        }), Some(true));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*col.get(&1).unwrap(), "a!");
        assert_eq!(col.update(&2, |_| true), None);
    }

    #[test]
    fn batch_update_changes_every_record() {
        let col: Collection<u32, u32> = Collection::new();
        col.upsert_many((0..5).map(|i| (i, i)));
        assert_eq!(col.update_all(|v| {
            *v += 1;
            true
        }), 5);
        let values: Vec<u32> = col.snapshot().iter().map(|v| **v).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn upsert_many_counts_new_keys() {
        let col: Collection<u32, u32> = Collection::new();
        assert_eq!(col.upsert_many([(1, 10), (2, 20)]), 2);
        assert_eq!(col.upsert_many([(2, 21), (3, 30)]), 1);
        assert_eq!(keys(&col), vec![1, 2, 3]);
        assert_eq!(*col.get(&2).unwrap(), 21);

        let mut rx = col.subscribe();
        rx.borrow_and_update();
        assert_eq!(col.upsert_many(std::iter::empty()), 0);
        assert!(!rx.has_changed().unwrap(), "empty batch publishes nothing");
    }

    #[test]
    fn replace_all_drops_only_missing_keys() {
        let col: Collection<u32, u32> = Collection::new();
        col.upsert_many((0..4).map(|i| (i, i)));
        let kept = col.get(&1).unwrap();

        col.replace_all([(1, 100), (2, 2), (7, 7)]);
        assert_eq!(keys(&col), vec![1, 2, 7]);
        assert_eq!(*col.get(&1).unwrap(), 100);
        assert_eq!(*kept, 1, "readers holding the old record keep it");
        assert_eq!(col.snapshot().len(), 3);
    }

    #[test]
    fn remove_where_drops_matching() {
        let col: Collection<u32, u32> = Collection::new();
        col.upsert_many((0..6).map(|i| (i, i)));
        let removed = col.remove_where(|v| v % 2 == 0);
        assert_eq!(removed.len(), 3);
        assert_eq!(keys(&col), vec![1, 3, 5]);
        assert_eq!(col.len(), 3);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let col: Collection<u32, u32> = Collection::new();
        let mut rx = col.subscribe();
        col.upsert(7, 70);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);
    }
}
