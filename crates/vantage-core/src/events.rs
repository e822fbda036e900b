// ── Event emitter ──
//
// Turns button and task notifications into bus events. One notification
// can fire several events; none are deduplicated, and events leave in the
// order their notifications arrived.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use vantage_link::{LinkEvent, ObjectProfile, ObjectState, ObjectType, SystemObject, Vid};

use crate::model::{
    BusEvent, BusEventData, BusEventType, ButtonEventData, Directory, TaskEventData,
};

const BUS_CAPACITY: usize = 1024;

// ── EventBus ─────────────────────────────────────────────────────────

/// Process-wide bus every entry fires onto.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Arc<BusEvent>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BusEvent>> {
        self.tx.subscribe()
    }

    /// Fire and forget. Returns how many listeners received it.
    pub fn fire(&self, event: BusEvent) -> usize {
        trace!(event_type = %event.event_type, subject = %event.subject(), "firing bus event");
        self.tx.send(Arc::new(event)).unwrap_or(0)
    }
}

// ── Translation ──────────────────────────────────────────────────────

/// Bus events for one `ObjectUpdated` notification, in firing order.
pub fn translate(
    entry_id: &str,
    vid: Vid,
    changes: &ObjectState,
    directory: &dyn Directory,
) -> Vec<BusEvent> {
    let Some(object) = directory.lookup(vid) else {
        return Vec::new();
    };
    let mut events = Vec::new();

    match object.object_type {
        ObjectType::Button => {
            let Some(is_down) = changes.is_down else {
                return events;
            };
            let (text1, text2) = match &object.profile {
                ObjectProfile::Button { text1, text2 } => (text1.clone(), text2.clone()),
                _ => (String::new(), String::new()),
            };
            let station = object
                .parent
                .and_then(|p| directory.lookup(p.vid))
                .filter(|s| s.object_type.is_station());
            let data = ButtonEventData {
                button_id: object.vid,
                button_name: object.name.clone(),
                button_position: object.parent.map_or(0, |p| p.position),
                button_text1: text1,
                button_text2: text2,
                station_id: station.as_ref().map(|s| s.vid),
                station_name: station.map(|s| s.name),
            };
            let event_type = if is_down {
                BusEventType::ButtonPressed
            } else {
                BusEventType::ButtonReleased
            };
            events.push(BusEvent::new(event_type, entry_id, BusEventData::Button(data)));
        }
        ObjectType::Task => {
            if let Some(running) = changes.running {
                let event_type = if running {
                    BusEventType::TaskStarted
                } else {
                    BusEventType::TaskStopped
                };
                events.push(BusEvent::new(
                    event_type,
                    entry_id,
                    BusEventData::Task(TaskEventData {
                        task_id: object.vid,
                        task_name: object.name.clone(),
                        task_state: None,
                    }),
                ));
            }
            if let Some(state) = changes.task_state {
                events.push(BusEvent::new(
                    BusEventType::TaskStateChanged,
                    entry_id,
                    BusEventData::Task(TaskEventData {
                        task_id: object.vid,
                        task_name: object.name,
                        task_state: Some(state),
                    }),
                ));
            }
        }
        _ => {}
    }
    events
}

// ── Emitter directory ────────────────────────────────────────────────

/// The emitter's own copy of the object directory. It is advanced by the
/// same event stream the emitter translates, so a button added and then
/// pressed is known by the time its press is translated.
pub(crate) struct EmitterDirectory {
    objects: HashMap<Vid, SystemObject>,
}

impl EmitterDirectory {
    pub(crate) fn new(objects: impl IntoIterator<Item = SystemObject>) -> Self {
        Self {
            objects: objects.into_iter().map(|o| (o.vid, o)).collect(),
        }
    }

    /// Apply the directory change `event` carries, if any.
    fn observe(&mut self, event: &LinkEvent) {
        match event {
            LinkEvent::ObjectAdded { object } => {
                self.objects.insert(object.vid, object.clone());
            }
            LinkEvent::ObjectDeleted { vid } => {
                self.objects.remove(vid);
            }
            LinkEvent::Reconnected { objects } => {
                self.objects = objects.iter().map(|o| (o.vid, o.clone())).collect();
            }
            LinkEvent::ObjectUpdated { .. }
            | LinkEvent::ObjectUnreachable { .. }
            | LinkEvent::Disconnected { .. } => {}
        }
    }

    fn sorted(&self, mut f: impl FnMut(&SystemObject) -> bool) -> Vec<SystemObject> {
        let mut found: Vec<SystemObject> =
            self.objects.values().filter(|o| f(o)).cloned().collect();
        found.sort_by_key(|o| o.vid);
        found
    }
}

impl Directory for EmitterDirectory {
    fn lookup(&self, vid: Vid) -> Option<SystemObject> {
        self.objects.get(&vid).cloned()
    }

    fn children_of(&self, parent: Vid) -> Vec<SystemObject> {
        self.sorted(|o| o.parent.is_some_and(|p| p.vid == parent))
    }

    fn master(&self) -> Option<Vid> {
        self.objects
            .values()
            .filter(|o| o.object_type == ObjectType::Master)
            .map(|o| o.vid)
            .min()
    }

    fn tasks(&self) -> Vec<SystemObject> {
        self.sorted(|o| o.object_type == ObjectType::Task)
    }
}

// ── Emitter loop ─────────────────────────────────────────────────────

/// Consume link events for one entry and fire bus events until cancelled
/// or the link goes away.
pub(crate) async fn emitter_task(
    entry_id: String,
    mut rx: broadcast::Receiver<Arc<LinkEvent>>,
    mut directory: EmitterDirectory,
    bus: EventBus,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Ok(event) => {
                    if let LinkEvent::ObjectUpdated { vid, changes } = event.as_ref() {
                        for bus_event in translate(&entry_id, *vid, changes, &directory) {
                            bus.fire(bus_event);
                        }
                    } else {
                        directory.observe(&event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(entry_id, skipped, "event emitter lagged; notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!(entry_id, "event emitter stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn directory() -> Vec<SystemObject> {
        vec![
            SystemObject::new(10, "Kitchen Keypad", ObjectType::Keypad),
            SystemObject::new(11, "Scene 1", ObjectType::Button)
                .with_parent(10, 3)
                .with_profile(ObjectProfile::Button {
                    text1: "Dinner".into(),
                    text2: "Party".into(),
                }),
            SystemObject::new(12, "Orphan", ObjectType::Button).with_parent(99, 1),
            SystemObject::new(683, "Toggle Office Lights", ObjectType::Task),
        ]
    }

    fn down(is_down: bool) -> ObjectState {
        ObjectState {
            is_down: Some(is_down),
            ..ObjectState::default()
        }
    }

    #[test]
    fn press_and_release_share_payload_shape() {
        let dir = directory();
        let pressed = translate("e1", Vid(11), &down(true), &dir);
        let released = translate("e1", Vid(11), &down(false), &dir);
        assert_eq!(pressed.len(), 1);
        assert_eq!(pressed[0].event_type, BusEventType::ButtonPressed);
        assert_eq!(released[0].event_type, BusEventType::ButtonReleased);
        assert_eq!(pressed[0].data, released[0].data);
        assert_eq!(pressed[0].entry_id, "e1");

        insta::assert_json_snapshot!(pressed[0].data, @r#"
        {
          "button_id": 11,
          "button_name": "Scene 1",
          "button_position": 3,
          "button_text1": "Dinner",
          "button_text2": "Party",
          "station_id": 10,
          "station_name": "Kitchen Keypad"
        }
        "#);
    }

    #[test]
    fn unknown_station_is_omitted() {
        let events = translate("e1", Vid(12), &down(true), &directory());
        let BusEventData::Button(data) = &events[0].data else {
            panic!("expected a button payload");
        };
        assert_eq!(data.station_id, None);
        assert_eq!(data.station_name, None);
    }

    #[test]
    fn button_without_is_down_change_fires_nothing() {
        let changes = ObjectState {
            triggered: Some(true),
            ..ObjectState::default()
        };
        assert!(translate("e1", Vid(11), &changes, &directory()).is_empty());
    }

    #[test]
    fn task_running_and_state_fire_in_order() {
        let changes = ObjectState {
            running: Some(true),
            task_state: Some(2),
            ..ObjectState::default()
        };
        let events = translate("e1", Vid(683), &changes, &directory());
        let types: Vec<BusEventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![BusEventType::TaskStarted, BusEventType::TaskStateChanged]
        );
        insta::assert_json_snapshot!(events[1].data, @r#"
        {
          "task_id": 683,
          "task_name": "Toggle Office Lights",
          "task_state": 2
        }
        "#);
    }

    #[test]
    fn unknown_objects_fire_nothing() {
        assert!(translate("e1", Vid(5000), &down(true), &directory()).is_empty());
    }

    fn press(vid: u32) -> Arc<LinkEvent> {
        Arc::new(LinkEvent::ObjectUpdated {
            vid: Vid(vid),
            changes: down(true),
        })
    }

    async fn next_button(bus: &mut broadcast::Receiver<Arc<BusEvent>>) -> ButtonEventData {
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), bus.recv())
            .await
            .unwrap()
            .unwrap();
        match &event.data {
            BusEventData::Button(data) => data.clone(),
            BusEventData::Task(_) => panic!("expected a button event"),
        }
    }

    #[tokio::test]
    async fn buttons_added_live_fire_on_their_first_press() {
        let (tx, rx) = broadcast::channel(16);
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let cancel = CancellationToken::new();
        let emitter = tokio::spawn(emitter_task(
            "e1".into(),
            rx,
            EmitterDirectory::new(directory()),
            bus.clone(),
            cancel.clone(),
        ));

        // Added then pressed, back to back.
        let added = SystemObject::new(13, "Scene 3", ObjectType::Button).with_parent(10, 5);
        tx.send(Arc::new(LinkEvent::ObjectAdded { object: added })).unwrap();
        tx.send(press(13)).unwrap();
        let data = next_button(&mut events).await;
        assert_eq!(data.button_id, Vid(13));
        assert_eq!(data.station_name.as_deref(), Some("Kitchen Keypad"));

        // A reconnect brings a new keypad; its button fires right away.
        let mut fresh = directory();
        fresh.push(SystemObject::new(20, "Hall Keypad", ObjectType::Keypad));
        fresh.push(SystemObject::new(21, "Away", ObjectType::Button).with_parent(20, 1));
        tx.send(Arc::new(LinkEvent::Reconnected { objects: fresh })).unwrap();
        tx.send(press(21)).unwrap();
        assert_eq!(next_button(&mut events).await.station_id, Some(Vid(20)));

        // Deleted objects stop firing.
        tx.send(Arc::new(LinkEvent::ObjectDeleted { vid: Vid(21) })).unwrap();
        tx.send(press(21)).unwrap();
        tx.send(press(11)).unwrap();
        assert_eq!(next_button(&mut events).await.button_id, Vid(11));

        cancel.cancel();
        emitter.await.unwrap();
    }

    #[tokio::test]
    async fn bus_delivers_to_every_subscriber() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let events = translate("e1", Vid(11), &down(true), &directory());
        let delivered = bus.fire(events.into_iter().next().unwrap());
        assert_eq!(delivered, 2);
        assert_eq!(a.recv().await.unwrap().subject(), Vid(11));
        assert_eq!(b.recv().await.unwrap().subject(), Vid(11));
    }
}
