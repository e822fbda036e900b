// ── Live object state ──
//
// Every field is optional: a directory fetch fills in whatever the
// controller reports, and a push notification carries only the fields
// that changed. Merging is last-write-wins per field.

use serde::{Deserialize, Serialize};

/// Thermostat operating mode as the controller names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationMode {
    Off,
    Cool,
    Heat,
    Auto,
}

/// Thermostat fan mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FanMode {
    Off,
    On,
}

/// What the HVAC plant is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HvacStatus {
    Off,
    Cooling,
    Heating,
}

/// A variable or sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Float(_) | Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! object_state {
    ($( $(#[$meta:meta])* $field:ident : $ty:ty ),* $(,)?) => {
        /// Live state of a controller object.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct ObjectState {
            $(
                $(#[$meta])*
                #[serde(skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl ObjectState {
            /// Overwrite every field present in `changes`. Absent fields are untouched.
            pub fn merge(&mut self, changes: &ObjectState) {
                $(
                    if let Some(v) = &changes.$field {
                        self.$field = Some(v.clone());
                    }
                )*
            }

            /// Names of the fields carried by this state (i.e. what changed,
            /// when `self` is a push notification).
            pub fn changed_attributes(&self) -> Vec<&'static str> {
                let mut names = Vec::new();
                $(
                    if self.$field.is_some() {
                        names.push(stringify!($field));
                    }
                )*
                names
            }
        }
    };
}

object_state! {
    /// Load / group brightness, 0..=100.
    level: f64,
    /// Shade position, 0 (closed) ..= 100 (open).
    position: f64,
    /// Hue (degrees), saturation (%), lightness (%).
    hsl: [f64; 3],
    rgb: [u8; 3],
    rgbw: [u8; 4],
    /// Colour temperature in kelvin.
    color_temp: u16,
    triggered: bool,
    value: Value,
    is_down: bool,
    running: bool,
    /// Task LED state code.
    task_state: i32,
    operation_mode: OperationMode,
    fan_mode: FanMode,
    hvac_status: HvacStatus,
}

impl ObjectState {
    pub fn is_empty(&self) -> bool {
        self.changed_attributes().is_empty()
    }

    pub fn has_changed(&self, attribute: &str) -> bool {
        self.changed_attributes().contains(&attribute)
    }
}
