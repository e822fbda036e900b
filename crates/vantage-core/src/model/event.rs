// ── Bus events ──
//
// Discrete, named events fired for automation consumers. Payload field
// names are a public contract: automations match on them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use vantage_link::Vid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr)]
pub enum BusEventType {
    #[serde(rename = "vantage_button_pressed")]
    #[strum(serialize = "vantage_button_pressed")]
    ButtonPressed,
    #[serde(rename = "vantage_button_released")]
    #[strum(serialize = "vantage_button_released")]
    ButtonReleased,
    #[serde(rename = "vantage_task_started")]
    #[strum(serialize = "vantage_task_started")]
    TaskStarted,
    #[serde(rename = "vantage_task_stopped")]
    #[strum(serialize = "vantage_task_stopped")]
    TaskStopped,
    #[serde(rename = "vantage_task_state_changed")]
    #[strum(serialize = "vantage_task_state_changed")]
    TaskStateChanged,
}

impl BusEventType {
    pub fn is_button(self) -> bool {
        matches!(self, Self::ButtonPressed | Self::ButtonReleased)
    }
}

/// Payload of a button press or release. Both share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonEventData {
    pub button_id: Vid,
    pub button_name: String,
    pub button_position: u32,
    pub button_text1: String,
    pub button_text2: String,
    /// Present only when the owning station is in the directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station_id: Option<Vid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskEventData {
    pub task_id: Vid,
    pub task_name: String,
    /// LED state code; state-changed events only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_state: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BusEventData {
    Button(ButtonEventData),
    Task(TaskEventData),
}

/// One fired event, tagged with the config entry it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusEvent {
    pub event_type: BusEventType,
    pub entry_id: String,
    pub data: BusEventData,
    pub time_fired: DateTime<Utc>,
}

impl BusEvent {
    pub fn new(event_type: BusEventType, entry_id: impl Into<String>, data: BusEventData) -> Self {
        Self {
            event_type,
            entry_id: entry_id.into(),
            data,
            time_fired: Utc::now(),
        }
    }

    /// The object the event is about: button or task vid.
    pub fn subject(&self) -> Vid {
        match &self.data {
            BusEventData::Button(b) => b.button_id,
            BusEventData::Task(t) => t.task_id,
        }
    }
}
