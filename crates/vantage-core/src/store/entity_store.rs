// ── Entity store ──
//
// Per-entry cache of the controller's object directory plus the entities
// and devices projected from it. Push notifications overwrite cached
// fields (last-write-wins); every object is updated under its own map
// lock so readers never see a torn merge.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use tracing::debug;
use vantage_link::{ObjectState, ObjectType, SystemObject, Vid};

use super::collection::{Collection, Snapshot};
use super::stream::EntityStream;
use crate::model::{
    DeviceInfo, Directory, Entity, EntityKind, classify, device_info, is_parent_device, project,
    variables_device, variables_device_id,
};

/// What applying one push notification did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The object is in the directory.
    pub known: bool,
    /// The object had been unreachable and is reachable again.
    pub restored: bool,
}

/// What re-enumerating the directory did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entities created for objects that were not present before.
    pub added: Vec<Vid>,
    /// Entities whose object disappeared; now stale.
    pub stale: Vec<Vid>,
    /// Stale entities whose object came back.
    pub restored: Vec<Vid>,
}

pub struct EntityStore {
    objects: DashMap<Vid, SystemObject>,
    unreachable: DashSet<Vid>,
    connected: AtomicBool,
    entities: Collection<Vid, Entity>,
    devices: Collection<String, DeviceInfo>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            unreachable: DashSet::new(),
            connected: AtomicBool::new(true),
            entities: Collection::new(),
            devices: Collection::new(),
        }
    }

    // ── Loading ──────────────────────────────────────────────────────

    /// Replace everything with a freshly enumerated directory.
    pub fn load(&self, objects: Vec<SystemObject>) {
        self.replace_objects(objects);
        self.unreachable.clear();
        let entities: Vec<(Vid, Entity)> = self
            .sorted_vids()
            .into_iter()
            .filter_map(|vid| Some((vid, self.build_entity(vid)?)))
            .collect();
        self.entities.replace_all(entities);
        self.rebuild_devices();
        debug!(
            objects = self.objects.len(),
            entities = self.entities.len(),
            devices = self.devices.len(),
            "directory loaded"
        );
    }

    /// Re-enumerate after a reconnect: add new objects, refresh known ones,
    /// and mark entities stale whose objects are gone.
    pub fn reconcile(&self, objects: Vec<SystemObject>, now: DateTime<Utc>) -> ReconcileReport {
        let fresh = self.replace_objects(objects);
        // A fresh enumeration resets per-object reachability.
        self.unreachable.clear();

        let mut report = ReconcileReport::default();
        let connected = self.is_connected();

        let mut rebuilt = Vec::new();
        for vid in self.sorted_vids() {
            let Some(mut entity) = self.build_entity(vid) else {
                continue;
            };
            match self.entities.get(&vid) {
                None => report.added.push(vid),
                Some(existing) if existing.is_stale() => report.restored.push(vid),
                Some(_) => {}
            }
            entity.available = connected;
            rebuilt.push((vid, entity));
        }
        self.entities.upsert_many(rebuilt);

        self.entities.update_all(|e| {
            if fresh.contains(&e.vid) {
                return false;
            }
            let was_available = std::mem::replace(&mut e.available, false);
            if e.stale_since.is_none() {
                e.stale_since = Some(now);
                report.stale.push(e.vid);
                true
            } else {
                was_available
            }
        });
        report.stale.sort();

        self.rebuild_devices();
        report
    }

    // ── Push notifications ──────────────────────────────────────────

    /// Merge `changes` into the cached object and re-render its entity
    /// (and its thermostat, when the object is a thermostat child).
    pub fn apply_update(&self, vid: Vid, changes: &ObjectState) -> UpdateOutcome {
        let parent = {
            let Some(mut object) = self.objects.get_mut(&vid) else {
                return UpdateOutcome::default();
            };
            object.state.merge(changes);
            object.parent.map(|p| p.vid)
        };

        let restored = self.unreachable.remove(&vid).is_some();
        let available = self.is_connected();
        self.refresh_entity(vid, restored.then_some(available));

        if let Some(parent) = parent {
            let parent_is_thermostat = self
                .objects
                .get(&parent)
                .is_some_and(|p| p.object_type.is_thermostat());
            if parent_is_thermostat {
                self.refresh_entity(parent, None);
            }
        }

        UpdateOutcome {
            known: true,
            restored,
        }
    }

    /// Register an object added after setup. Returns its entity, if any.
    pub fn insert_object(&self, object: SystemObject) -> Option<Arc<Entity>> {
        let vid = object.vid;
        self.unreachable.remove(&vid);
        self.objects.insert(vid, object);
        let mut entity = self.build_entity(vid)?;
        entity.available = self.is_connected();
        self.entities.upsert(vid, entity);
        self.rebuild_devices();
        self.entities.get(&vid)
    }

    /// The controller deleted `vid`. Its entity goes stale; returns `true`
    /// if the entity was not stale already.
    pub fn mark_deleted(&self, vid: Vid, now: DateTime<Utc>) -> bool {
        self.objects.remove(&vid);
        self.unreachable.remove(&vid);
        let marked = self.entities.update(&vid, |e| {
            let fresh = e.stale_since.is_none();
            if fresh {
                e.stale_since = Some(now);
            }
            let was_available = std::mem::replace(&mut e.available, false);
            fresh || was_available
        }) == Some(true);
        self.rebuild_devices();
        marked
    }

    /// Returns `true` if this flipped the object from reachable.
    pub fn mark_unreachable(&self, vid: Vid) -> bool {
        if !self.objects.contains_key(&vid) || !self.unreachable.insert(vid) {
            return false;
        }
        self.entities.update(&vid, |e| std::mem::replace(&mut e.available, false));
        true
    }

    /// Record connection-level availability. Returns `true` on a transition.
    pub fn set_connected(&self, connected: bool) -> bool {
        if self.connected.swap(connected, Ordering::SeqCst) == connected {
            return false;
        }
        let unreachable = &self.unreachable;
        self.entities.update_all(|e| {
            let available = connected && !e.is_stale() && !unreachable.contains(&e.vid);
            std::mem::replace(&mut e.available, available) != available
        });
        true
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Mark one entity unavailable after the controller refused it.
    pub fn mark_entity_unavailable(&self, vid: Vid) -> bool {
        self.entities
            .update(&vid, |e| std::mem::replace(&mut e.available, false))
            .unwrap_or(false)
    }

    // ── Stale cleanup ───────────────────────────────────────────────

    /// Remove stale entities whose grace period has elapsed.
    pub fn sweep(&self, now: DateTime<Utc>, grace: Duration) -> Vec<Arc<Entity>> {
        let grace = chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::MAX);
        let removed = self
            .entities
            .remove_where(|e| e.stale_since.is_some_and(|since| now - since >= grace));
        if !removed.is_empty() {
            self.rebuild_devices();
        }
        removed
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn object(&self, vid: Vid) -> Option<SystemObject> {
        self.objects.get(&vid).map(|o| o.value().clone())
    }

    /// Every cached object, ordered by vid.
    pub fn objects(&self) -> Vec<SystemObject> {
        self.sorted_vids()
            .into_iter()
            .filter_map(|vid| self.object(vid))
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn entity(&self, vid: Vid) -> Option<Arc<Entity>> {
        self.entities.get(&vid)
    }

    pub fn entities_snapshot(&self) -> Snapshot<Entity> {
        self.entities.snapshot()
    }

    pub fn subscribe_entities(&self) -> EntityStream {
        EntityStream::new(self.entities.subscribe())
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn device(&self, id: &str) -> Option<Arc<DeviceInfo>> {
        self.devices.get(&id.to_owned())
    }

    pub fn devices_snapshot(&self) -> Snapshot<DeviceInfo> {
        self.devices.snapshot()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    // ── Private helpers ─────────────────────────────────────────────

    /// Upsert `objects` in place and drop the vids no longer listed, so
    /// concurrent readers never see a partial directory.
    fn replace_objects(&self, objects: Vec<SystemObject>) -> HashSet<Vid> {
        let fresh: HashSet<Vid> = objects.iter().map(|o| o.vid).collect();
        for object in objects {
            self.objects.insert(object.vid, object);
        }
        self.objects.retain(|vid, _| fresh.contains(vid));
        fresh
    }

    fn sorted_vids(&self) -> Vec<Vid> {
        let mut vids: Vec<Vid> = self.objects.iter().map(|r| *r.key()).collect();
        vids.sort();
        vids
    }

    fn build_entity(&self, vid: Vid) -> Option<Entity> {
        let object = self.object(vid)?;
        let kind = classify(&object)?;
        let children = self.children_for(&kind, vid);
        let device_id = if kind.is_variable() {
            self.master()
                .map_or_else(|| vid.to_string(), variables_device_id)
        } else {
            vid.to_string()
        };
        Some(Entity::new(&object, kind, &children, device_id))
    }

    fn children_for(&self, kind: &EntityKind, vid: Vid) -> Vec<SystemObject> {
        if matches!(kind, EntityKind::Climate) {
            self.children_of(vid)
        } else {
            Vec::new()
        }
    }

    /// Re-render the entity for `vid`. `available` overrides availability
    /// when set.
    fn refresh_entity(&self, vid: Vid, available: Option<bool>) {
        let Some(object) = self.object(vid) else {
            return;
        };
        let Some(entity) = self.entities.get(&vid) else {
            return;
        };
        let children = self.children_for(&entity.kind, vid);
        let state = project(&entity.kind, &object, &children);
        self.entities.update(&vid, |e| {
            let mut changed = false;
            if e.state != state {
                e.state = state;
                changed = true;
            }
            if let Some(available) = available {
                changed |= std::mem::replace(&mut e.available, available) != available;
            }
            changed
        });
    }

    /// Recompute the device set from the directory and current entities.
    /// Devices of stale entities survive until the entity is swept.
    fn rebuild_devices(&self) {
        let mut wanted: Vec<DeviceInfo> = Vec::new();
        let mut has_variables = false;
        for object in self.objects() {
            let entity = self.entities.get(&object.vid);
            if entity.as_ref().is_some_and(|e| e.kind.is_variable()) {
                has_variables = true;
                continue;
            }
            if entity.is_some() || is_parent_device(&object) {
                wanted.extend(device_info(&object, self));
            }
        }
        if has_variables {
            wanted.extend(self.master().map(variables_device));
        }

        let referenced: HashSet<String> = self
            .entities
            .snapshot()
            .iter()
            .map(|e| e.device_id.clone())
            .collect();
        let wanted_ids: HashSet<String> = wanted.iter().map(|d| d.id.clone()).collect();
        self.devices
            .remove_where(|d| !wanted_ids.contains(&d.id) && !referenced.contains(&d.id));

        let changed: Vec<(String, DeviceInfo)> = wanted
            .into_iter()
            .filter(|device| self.devices.get(&device.id).is_none_or(|d| *d != *device))
            .map(|device| (device.id.clone(), device))
            .collect();
        self.devices.upsert_many(changed);
    }
}

impl Directory for EntityStore {
    fn lookup(&self, vid: Vid) -> Option<SystemObject> {
        self.object(vid)
    }

    fn children_of(&self, parent: Vid) -> Vec<SystemObject> {
        let mut children: Vec<SystemObject> = self
            .objects
            .iter()
            .filter(|o| o.parent.is_some_and(|p| p.vid == parent))
            .map(|o| o.value().clone())
            .collect();
        children.sort_by_key(|o| o.vid);
        children
    }

    fn master(&self) -> Option<Vid> {
        self.objects
            .iter()
            .filter(|o| o.object_type == ObjectType::Master)
            .map(|o| o.vid)
            .min()
    }

    fn tasks(&self) -> Vec<SystemObject> {
        let mut tasks: Vec<SystemObject> = self
            .objects
            .iter()
            .filter(|o| o.object_type == ObjectType::Task)
            .map(|o| o.value().clone())
            .collect();
        tasks.sort_by_key(|o| o.vid);
        tasks
    }
}
