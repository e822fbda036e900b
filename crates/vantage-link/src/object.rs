// ── Controller object model ──
//
// Typed view of the objects a controller exposes through its object
// directory. Static configuration lives in `ObjectProfile`; live, pushed
// state lives in `ObjectState` (see `state.rs`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::state::ObjectState;

// ── Vid ─────────────────────────────────────────────────────────────

/// Controller-assigned object id. Unique and stable across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vid(pub u32);

impl fmt::Display for Vid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Vid {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<u32> for Vid {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

// ── ObjectType ──────────────────────────────────────────────────────

/// The controller's type tag for an object.
///
/// Known tags get their own variant; anything else is preserved verbatim
/// in [`Other`](Self::Other) so nothing from the controller is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ObjectType {
    // Loads
    Load,
    LoadGroup,
    RgbLoad,
    // Shades
    Blind,
    BlindGroup,
    QisBlind,
    QubeBlind,
    RelayBlind,
    SomfyRs485Shade,
    SomfyUrtsi2Shade,
    SomfyRs485Group,
    SomfyUrtsi2Group,
    // Climate
    Thermostat,
    HvacIuZone,
    // Sensors
    Temperature,
    DryContact,
    OmniSensor,
    AnemoSensor,
    LightSensor,
    // Variables
    GMem,
    // Keypads
    Button,
    Station,
    Keypad,
    Dimmer,
    DualRelayStation,
    EqCtrl,
    EqUx,
    ScenePointRelay,
    // Programming
    Task,
    // Hardware / topology
    Master,
    Module,
    ModuleGen2,
    BackBox,
    Area,
    Other(String),
}

impl ObjectType {
    /// The raw tag as the controller reports it.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Load => "Load",
            Self::LoadGroup => "LoadGroup",
            Self::RgbLoad => "RGBLoad",
            Self::Blind => "Blind",
            Self::BlindGroup => "BlindGroup",
            Self::QisBlind => "QISBlind",
            Self::QubeBlind => "QubeBlind",
            Self::RelayBlind => "RelayBlind",
            Self::SomfyRs485Shade => "Somfy.RS-485_Shade_CHILD",
            Self::SomfyUrtsi2Shade => "Somfy.URTSI_2_Shade_CHILD",
            Self::SomfyRs485Group => "Somfy.RS-485_Group_CHILD",
            Self::SomfyUrtsi2Group => "Somfy.URTSI_2_Group_CHILD",
            Self::Thermostat => "Thermostat",
            Self::HvacIuZone => "Vantage.HVAC-IU_Zone_CHILD",
            Self::Temperature => "Temperature",
            Self::DryContact => "DryContact",
            Self::OmniSensor => "OmniSensor",
            Self::AnemoSensor => "AnemoSensor",
            Self::LightSensor => "LightSensor",
            Self::GMem => "GMem",
            Self::Button => "Button",
            Self::Station => "Station",
            Self::Keypad => "Keypad",
            Self::Dimmer => "Dimmer",
            Self::DualRelayStation => "DualRelayStation",
            Self::EqCtrl => "EqCtrl",
            Self::EqUx => "EqUX",
            Self::ScenePointRelay => "ScenePointRelay",
            Self::Task => "Task",
            Self::Master => "Master",
            Self::Module => "Module",
            Self::ModuleGen2 => "ModuleGen2",
            Self::BackBox => "BackBox",
            Self::Area => "Area",
            Self::Other(tag) => tag,
        }
    }

    /// Individual shades, including every named vendor variant.
    pub fn is_blind(&self) -> bool {
        matches!(
            self,
            Self::Blind
                | Self::QisBlind
                | Self::QubeBlind
                | Self::RelayBlind
                | Self::SomfyRs485Shade
                | Self::SomfyUrtsi2Shade
        )
    }

    pub fn is_blind_group(&self) -> bool {
        matches!(
            self,
            Self::BlindGroup | Self::SomfyRs485Group | Self::SomfyUrtsi2Group
        )
    }

    pub fn is_thermostat(&self) -> bool {
        matches!(self, Self::Thermostat | Self::HvacIuZone)
    }

    /// Keypads and other button-bearing stations.
    pub fn is_station(&self) -> bool {
        matches!(
            self,
            Self::Station
                | Self::Keypad
                | Self::Dimmer
                | Self::DualRelayStation
                | Self::EqCtrl
                | Self::EqUx
                | Self::ScenePointRelay
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ObjectType {
    fn from(tag: &str) -> Self {
        match tag {
            "Load" => Self::Load,
            "LoadGroup" => Self::LoadGroup,
            // DMX / DALI gateway colour loads report under several tags.
            "RGBLoad" | "Vantage.DDGColorLoad" | "Vantage.DGColorLoad" => Self::RgbLoad,
            "Blind" => Self::Blind,
            "BlindGroup" => Self::BlindGroup,
            "QISBlind" => Self::QisBlind,
            "QubeBlind" => Self::QubeBlind,
            "RelayBlind" => Self::RelayBlind,
            "Somfy.RS-485_Shade_CHILD" => Self::SomfyRs485Shade,
            "Somfy.URTSI_2_Shade_CHILD" => Self::SomfyUrtsi2Shade,
            "Somfy.RS-485_Group_CHILD" => Self::SomfyRs485Group,
            "Somfy.URTSI_2_Group_CHILD" => Self::SomfyUrtsi2Group,
            "Thermostat" => Self::Thermostat,
            "Vantage.HVAC-IU_Zone_CHILD" => Self::HvacIuZone,
            "Temperature" => Self::Temperature,
            "DryContact" => Self::DryContact,
            "OmniSensor" => Self::OmniSensor,
            "AnemoSensor" => Self::AnemoSensor,
            "LightSensor" => Self::LightSensor,
            "GMem" => Self::GMem,
            "Button" => Self::Button,
            "Station" => Self::Station,
            "Keypad" => Self::Keypad,
            "Dimmer" => Self::Dimmer,
            "DualRelayStation" => Self::DualRelayStation,
            "EqCtrl" => Self::EqCtrl,
            "EqUX" => Self::EqUx,
            "ScenePointRelay" => Self::ScenePointRelay,
            "Task" => Self::Task,
            "Master" => Self::Master,
            "Module" => Self::Module,
            "ModuleGen2" => Self::ModuleGen2,
            "BackBox" => Self::BackBox,
            "Area" => Self::Area,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for ObjectType {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<ObjectType> for String {
    fn from(t: ObjectType) -> Self {
        match t {
            ObjectType::Other(tag) => tag,
            known => known.as_str().to_owned(),
        }
    }
}

// ── Profiles ────────────────────────────────────────────────────────

/// Colour model of an RGB load behind a DMX or DALI gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorType {
    #[serde(rename = "HSL")]
    Hsl,
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "RGBW")]
    Rgbw,
    #[serde(rename = "CCT")]
    Cct,
}

/// Semantic tag attached to a GMem variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GMemTag {
    #[serde(rename = "Boolean")]
    Bool,
    Text,
    DeviceUnits,
    Level,
    Load,
    Task,
    Number,
    Delay,
    Seconds,
    DegC,
    #[serde(other)]
    Unknown,
}

/// What an OmniSensor measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OmniMeasure {
    Current,
    Power,
    Temperature,
}

fn default_min_kelvin() -> u16 {
    2000
}

fn default_max_kelvin() -> u16 {
    6500
}

/// Static, type-specific configuration read from the object directory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectProfile {
    #[default]
    Generic,
    Load {
        /// Load hardware type, e.g. `"Incandescent"`, `"High Voltage Relay"`, `"Motor"`.
        load_type: String,
    },
    RgbLoad {
        color_type: ColorType,
        #[serde(default = "default_min_kelvin")]
        min_kelvin: u16,
        #[serde(default = "default_max_kelvin")]
        max_kelvin: u16,
    },
    Blind {
        /// Shade hardware type, e.g. `"Drapery"`, `"Roller"`.
        shade_type: String,
    },
    #[serde(rename = "gmem")]
    GMem {
        tag: GMemTag,
        #[serde(default)]
        is_fixed: bool,
    },
    Button {
        #[serde(default)]
        text1: String,
        #[serde(default)]
        text2: String,
    },
    OmniSensor {
        measure: OmniMeasure,
    },
}

impl ObjectProfile {
    /// Load labelled as a relay.
    pub fn is_relay(&self) -> bool {
        matches!(self, Self::Load { load_type } if load_type.contains("Relay"))
    }

    /// Load labelled as a motor.
    pub fn is_motor(&self) -> bool {
        matches!(self, Self::Load { load_type } if load_type.contains("Motor"))
    }
}

// ── SystemObject ────────────────────────────────────────────────────

/// Parent link: the owning object and this object's ordinal within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub vid: Vid,
    #[serde(default)]
    pub position: u32,
}

/// An addressable unit in the controller's object directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemObject {
    pub vid: Vid,
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<Vid>,
    /// `"manufacturer.model"` for vendor hardware, free text otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub profile: ObjectProfile,
    #[serde(default)]
    pub state: ObjectState,
}

impl SystemObject {
    pub fn new(vid: impl Into<Vid>, name: impl Into<String>, object_type: ObjectType) -> Self {
        Self {
            vid: vid.into(),
            name: name.into(),
            object_type,
            parent: None,
            area: None,
            model: None,
            serial_number: None,
            firmware_version: None,
            profile: ObjectProfile::Generic,
            state: ObjectState::default(),
        }
    }

    pub fn with_parent(mut self, vid: impl Into<Vid>, position: u32) -> Self {
        self.parent = Some(ParentRef {
            vid: vid.into(),
            position,
        });
        self
    }

    pub fn with_profile(mut self, profile: ObjectProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_state(mut self, state: ObjectState) -> Self {
        self.state = state;
        self
    }

    pub fn with_area(mut self, area: impl Into<Vid>) -> Self {
        self.area = Some(area.into());
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn object_type_round_trips_known_and_unknown_tags() {
        assert_eq!(ObjectType::from("QISBlind"), ObjectType::QisBlind);
        assert_eq!(
            ObjectType::from("Somfy.URTSI_2_Shade_CHILD"),
            ObjectType::SomfyUrtsi2Shade
        );
        assert_eq!(ObjectType::from("Vantage.DDGColorLoad"), ObjectType::RgbLoad);

        let odd = ObjectType::from("Vantage.Mystery_PORT");
        assert_eq!(odd, ObjectType::Other("Vantage.Mystery_PORT".into()));
        assert_eq!(String::from(odd), "Vantage.Mystery_PORT");
    }

    #[test]
    fn relay_and_motor_labels() {
        let relay = ObjectProfile::Load {
            load_type: "High Voltage Relay".into(),
        };
        let motor = ObjectProfile::Load {
            load_type: "Motor".into(),
        };
        let dimmer = ObjectProfile::Load {
            load_type: "Incandescent".into(),
        };
        assert!(relay.is_relay() && !relay.is_motor());
        assert!(motor.is_motor() && !motor.is_relay());
        assert!(!dimmer.is_relay() && !dimmer.is_motor());
    }

    #[test]
    fn deserialize_object_from_yaml() {
        let yaml = r"
vid: 214
name: Kitchen Pendants
type: Load
parent: { vid: 12, position: 3 }
area: 7
profile: { kind: load, load_type: Incandescent }
state: { level: 42.5 }
";
        let obj: SystemObject = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(obj.vid, Vid(214));
        assert_eq!(obj.object_type, ObjectType::Load);
        assert_eq!(obj.parent.unwrap().position, 3);
        assert_eq!(obj.area, Some(Vid(7)));
        assert_eq!(obj.state.level, Some(42.5));
    }

    #[test]
    fn unknown_gmem_tag_is_preserved_as_unknown() {
        let profile: ObjectProfile =
            serde_json::from_str(r#"{"kind":"gmem","tag":"Fahrenheit"}"#).unwrap();
        assert_eq!(
            profile,
            ObjectProfile::GMem {
                tag: GMemTag::Unknown,
                is_fixed: false
            }
        );
    }

    #[test]
    fn vid_parses_from_string() {
        assert_eq!("683".parse::<Vid>().unwrap(), Vid(683));
        assert!("abc".parse::<Vid>().is_err());
    }
}
