// ── State projection ──
//
// Renders an object's cached controller state as the state of the entity
// it maps to. Projections are pure: the same object state always yields
// the same entity state, so the last notification wins.

use serde::{Deserialize, Serialize};
use vantage_link::{FanMode, HvacStatus, OperationMode, SystemObject, Value};

use super::classify::{BinarySource, EntityKind, LightVariant};

/// Climate temperature limits, degrees Celsius.
pub const CLIMATE_MIN_TEMP: f64 = 5.0;
pub const CLIMATE_MAX_TEMP: f64 = 40.0;

/// Child positions of a thermostat's temperature objects.
pub const INDOOR_POSITION: u32 = 1;
pub const COOL_SET_POINT_POSITION: u32 = 3;
pub const HEAT_SET_POINT_POSITION: u32 = 4;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HvacMode {
    Heat,
    Cool,
    HeatCool,
    Off,
}

impl From<OperationMode> for HvacMode {
    fn from(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Heat => Self::Heat,
            OperationMode::Cool => Self::Cool,
            OperationMode::Auto => Self::HeatCool,
            OperationMode::Off => Self::Off,
        }
    }
}

impl From<HvacMode> for OperationMode {
    fn from(mode: HvacMode) -> Self {
        match mode {
            HvacMode::Heat => Self::Heat,
            HvacMode::Cool => Self::Cool,
            HvacMode::HeatCool => Self::Auto,
            HvacMode::Off => Self::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacAction {
    Heating,
    Cooling,
    Off,
}

impl From<HvacStatus> for HvacAction {
    fn from(status: HvacStatus) -> Self {
        match status {
            HvacStatus::Heating => Self::Heating,
            HvacStatus::Cooling => Self::Cooling,
            HvacStatus::Off => Self::Off,
        }
    }
}

/// Climate fan mode. The controller's "off" means the fan follows the plant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClimateFanMode {
    Auto,
    On,
}

impl From<FanMode> for ClimateFanMode {
    fn from(mode: FanMode) -> Self {
        match mode {
            FanMode::Off => Self::Auto,
            FanMode::On => Self::On,
        }
    }
}

impl From<ClimateFanMode> for FanMode {
    fn from(mode: ClimateFanMode) -> Self {
        match mode {
            ClimateFanMode::Auto => Self::Off,
            ClimateFanMode::On => Self::On,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LightState {
    pub is_on: Option<bool>,
    pub brightness: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hs_color: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rgb_color: Option<[u8; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rgbw_color: Option<[u8; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_temp_kelvin: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverState {
    /// 0 closed, 100 open.
    pub position: Option<u8>,
    pub is_closed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClimateState {
    pub hvac_mode: Option<HvacMode>,
    pub hvac_action: Option<HvacAction>,
    pub fan_mode: Option<ClimateFanMode>,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub target_temperature_low: Option<f64>,
    pub target_temperature_high: Option<f64>,
}

/// Rendered state of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum EntityState {
    Light(LightState),
    Switch { is_on: Option<bool> },
    Cover(CoverState),
    Climate(ClimateState),
    BinarySensor { is_on: Option<bool> },
    Sensor { value: Option<f64>, unit: &'static str },
    Number { value: Option<f64> },
    Text { value: Option<String> },
}

impl EntityState {
    /// One-line rendering for tables and logs.
    pub fn summary(&self) -> String {
        fn on_off(v: Option<bool>) -> String {
            match v {
                Some(true) => "on".into(),
                Some(false) => "off".into(),
                None => "unknown".into(),
            }
        }
        fn num(v: Option<f64>) -> String {
            v.map_or_else(|| "unknown".into(), |v| format!("{v}"))
        }

        match self {
            Self::Light(s) => match (s.is_on, s.brightness) {
                (Some(true), Some(b)) => format!("on ({b}/255)"),
                (is_on, _) => on_off(is_on),
            },
            Self::Switch { is_on } | Self::BinarySensor { is_on } => on_off(*is_on),
            Self::Cover(s) => match (s.is_closed, s.position) {
                (Some(true), _) => "closed".into(),
                (_, Some(p)) => format!("open ({p}%)"),
                _ => "unknown".into(),
            },
            Self::Climate(s) => format!(
                "{} {}",
                s.hvac_mode.map_or_else(|| "unknown".into(), |m| m.to_string()),
                num(s.current_temperature)
            ),
            Self::Sensor { value, unit } => format!("{} {unit}", num(*value)),
            Self::Number { value } => num(*value),
            Self::Text { value } => value.clone().unwrap_or_else(|| "unknown".into()),
        }
    }
}

/// Project `object`'s cached state for an entity of `kind`.
///
/// `children` are the object's child objects; only climate entities read
/// them (indoor temperature and set points).
pub fn project(kind: &EntityKind, object: &SystemObject, children: &[SystemObject]) -> EntityState {
    let state = &object.state;
    match kind {
        EntityKind::Light { light } => {
            let mut rendered = LightState {
                is_on: state.level.map(|l| l > 0.0),
                brightness: state.level.map(level_to_brightness),
                ..LightState::default()
            };
            if let LightVariant::Color { .. } = light {
                rendered.hs_color = state.hsl.map(|[h, s, _]| [h, s]);
                rendered.rgb_color = state.rgb;
                rendered.rgbw_color = state.rgbw;
                rendered.color_temp_kelvin = state.color_temp;
            }
            EntityState::Light(rendered)
        }
        EntityKind::Switch => EntityState::Switch {
            is_on: state.level.map(|l| l > 0.0),
        },
        EntityKind::Cover { .. } => EntityState::Cover(CoverState {
            position: state.position.map(percent),
            is_closed: state.position.map(|p| p <= 0.0),
        }),
        EntityKind::Climate => EntityState::Climate(project_climate(object, children)),
        EntityKind::BinarySensor { source } => EntityState::BinarySensor {
            is_on: match source {
                BinarySource::DryContact => state.triggered,
                BinarySource::Variable => state.value.as_ref().and_then(Value::as_bool),
            },
        },
        EntityKind::Sensor { sensor } => {
            let raw = state
                .value
                .as_ref()
                .and_then(Value::as_f64)
                .or(state.level);
            EntityState::Sensor {
                value: match sensor.precision() {
                    Some(places) => raw.map(|v| round_to(v, places)),
                    None => raw,
                },
                unit: sensor.unit(),
            }
        }
        EntityKind::Number { range } => {
            let raw = state.value.as_ref().and_then(Value::as_f64);
            EntityState::Number {
                value: if range.fixed { raw.map(|v| v / 1000.0) } else { raw },
            }
        }
        EntityKind::Text => EntityState::Text {
            value: state.value.as_ref().map(|v| match v {
                Value::Text(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                Value::Int(i) => i.to_string(),
                Value::Float(f) => f.to_string(),
            }),
        },
    }
}

fn project_climate(thermostat: &SystemObject, children: &[SystemObject]) -> ClimateState {
    let at = |position: u32| {
        children
            .iter()
            .find(|c| {
                c.parent
                    .is_some_and(|p| p.vid == thermostat.vid && p.position == position)
            })
            .and_then(|c| c.state.value.as_ref().and_then(Value::as_f64))
    };
    let cool = at(COOL_SET_POINT_POSITION);
    let heat = at(HEAT_SET_POINT_POSITION);
    let state = &thermostat.state;
    let mode = state.operation_mode.map(HvacMode::from);

    ClimateState {
        hvac_mode: mode,
        hvac_action: state.hvac_status.map(HvacAction::from),
        fan_mode: state.fan_mode.map(ClimateFanMode::from),
        current_temperature: at(INDOOR_POSITION),
        target_temperature: match mode {
            Some(HvacMode::Heat) => heat,
            Some(HvacMode::Cool) => cool,
            _ => None,
        },
        target_temperature_low: (mode == Some(HvacMode::HeatCool)).then_some(heat).flatten(),
        target_temperature_high: (mode == Some(HvacMode::HeatCool)).then_some(cool).flatten(),
    }
}

/// Controller level 0..=100 to a 0..=255 brightness.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
pub fn level_to_brightness(level: f64) -> u8 {
    (level / 100.0 * 255.0).round().clamp(0.0, 255.0) as u8
}

/// A 0..=255 brightness to a controller level 0..=100.
pub fn brightness_to_level(brightness: u8) -> f64 {
    f64::from(brightness) * 100.0 / 255.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn percent(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

fn round_to(value: f64, places: u8) -> f64 {
    let factor = 10f64.powi(i32::from(places));
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::classify::{CoverClass, NumberRange, classify};
    use pretty_assertions::assert_eq;
    use vantage_link::{ObjectState, ObjectType};

    fn with_state(object_type: ObjectType, state: ObjectState) -> SystemObject {
        SystemObject::new(100, "obj", object_type).with_state(state)
    }

    #[test]
    fn brightness_scaling_round_trips_endpoints() {
        assert_eq!(level_to_brightness(0.0), 0);
        assert_eq!(level_to_brightness(100.0), 255);
        assert_eq!(level_to_brightness(50.0), 128);
        assert!((brightness_to_level(255) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn light_reflects_level() {
        let kind = EntityKind::Light {
            light: LightVariant::Dimmable,
        };
        let obj = with_state(
            ObjectType::Load,
            ObjectState {
                level: Some(40.0),
                ..ObjectState::default()
            },
        );
        assert_eq!(
            project(&kind, &obj, &[]),
            EntityState::Light(LightState {
                is_on: Some(true),
                brightness: Some(102),
                ..LightState::default()
            })
        );
    }

    #[test]
    fn last_write_wins_across_notifications() {
        let kind = EntityKind::Switch;
        let mut obj = with_state(ObjectType::Load, ObjectState::default());
        for level in [100.0, 0.0, 35.0, 0.0] {
            obj.state.merge(&ObjectState {
                level: Some(level),
                ..ObjectState::default()
            });
        }
        assert_eq!(project(&kind, &obj, &[]), EntityState::Switch { is_on: Some(false) });
    }

    #[test]
    fn cover_closed_at_zero() {
        let kind = EntityKind::Cover {
            device_class: CoverClass::Shade,
        };
        let closed = with_state(
            ObjectType::Blind,
            ObjectState {
                position: Some(0.0),
                ..ObjectState::default()
            },
        );
        assert_eq!(
            project(&kind, &closed, &[]),
            EntityState::Cover(CoverState {
                position: Some(0),
                is_closed: Some(true)
            })
        );
    }

    #[test]
    fn climate_reads_child_temperatures_by_position() {
        let thermostat = SystemObject::new(20, "Hall", ObjectType::Thermostat).with_state(ObjectState {
            operation_mode: Some(OperationMode::Auto),
            fan_mode: Some(FanMode::Off),
            hvac_status: Some(HvacStatus::Heating),
            ..ObjectState::default()
        });
        let temp = |vid, pos, v| {
            SystemObject::new(vid, "t", ObjectType::Temperature)
                .with_parent(20, pos)
                .with_state(ObjectState {
                    value: Some(Value::Float(v)),
                    ..ObjectState::default()
                })
        };
        let children = [temp(21, 1, 21.5), temp(23, 3, 24.0), temp(24, 4, 19.0)];

        let EntityState::Climate(state) = project(&EntityKind::Climate, &thermostat, &children) else {
            panic!("expected climate state");
        };
        assert_eq!(state.hvac_mode, Some(HvacMode::HeatCool));
        assert_eq!(state.hvac_action, Some(HvacAction::Heating));
        assert_eq!(state.fan_mode, Some(ClimateFanMode::Auto));
        assert_eq!(state.current_temperature, Some(21.5));
        assert_eq!(state.target_temperature, None);
        assert_eq!(state.target_temperature_low, Some(19.0));
        assert_eq!(state.target_temperature_high, Some(24.0));
    }

    #[test]
    fn fixed_point_numbers_are_scaled() {
        let kind = EntityKind::Number {
            range: NumberRange {
                min: 0.0,
                max: 604_800.0,
                step: 0.001,
                fixed: true,
                unit: Some("s"),
            },
        };
        let obj = with_state(
            ObjectType::GMem,
            ObjectState {
                value: Some(Value::Int(1500)),
                ..ObjectState::default()
            },
        );
        assert_eq!(project(&kind, &obj, &[]), EntityState::Number { value: Some(1.5) });
    }

    #[test]
    fn current_sensor_rounds_to_three_places() {
        let obj = SystemObject::new(7, "Amps", ObjectType::OmniSensor)
            .with_profile(vantage_link::ObjectProfile::OmniSensor {
                measure: vantage_link::OmniMeasure::Current,
            })
            .with_state(ObjectState {
                level: Some(1.234_567),
                ..ObjectState::default()
            });
        let Some(kind) = classify(&obj) else {
            panic!("omni sensor should classify");
        };
        assert_eq!(
            project(&kind, &obj, &[]),
            EntityState::Sensor {
                value: Some(1.235),
                unit: "A"
            }
        );
    }

    #[test]
    fn unknown_state_is_none_not_default() {
        let obj = with_state(ObjectType::DryContact, ObjectState::default());
        let kind = EntityKind::BinarySensor {
            source: BinarySource::DryContact,
        };
        assert_eq!(project(&kind, &obj, &[]), EntityState::BinarySensor { is_on: None });
        assert_eq!(project(&kind, &obj, &[]).summary(), "unknown");
    }
}
