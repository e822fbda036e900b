// ── Link events ──
//
// Everything a session pushes to its subscribers. Per-object ordering is
// the order the controller sent them in.

use serde::{Deserialize, Serialize};

use crate::object::{SystemObject, Vid};
use crate::state::ObjectState;

/// A notification from the controller link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    /// A new object appeared after setup (controller reprogrammed live).
    ObjectAdded { object: SystemObject },

    /// One or more attributes of an object changed. `changes` carries only
    /// the changed fields.
    ObjectUpdated { vid: Vid, changes: ObjectState },

    /// The controller removed an object.
    ObjectDeleted { vid: Vid },

    /// The controller reports the object exists but cannot be reached
    /// (offline module, failed station bus).
    ObjectUnreachable { vid: Vid },

    /// The session dropped. Sent once per loss.
    Disconnected { reason: String },

    /// A new session is up. Carries the freshly enumerated directory.
    Reconnected { objects: Vec<SystemObject> },
}

impl LinkEvent {
    /// The object this event is scoped to, if any.
    pub fn vid(&self) -> Option<Vid> {
        match self {
            Self::ObjectAdded { object } => Some(object.vid),
            Self::ObjectUpdated { vid, .. }
            | Self::ObjectDeleted { vid }
            | Self::ObjectUnreachable { vid } => Some(*vid),
            Self::Disconnected { .. } | Self::Reconnected { .. } => None,
        }
    }
}
