// ── Entity classification ──
//
// Static type-and-label rules deciding which platform entity, if any, a
// controller object becomes. Rules are evaluated in order; the first
// match wins. Changing them renames entities, so treat them as stable.

use serde::Serialize;
use vantage_link::{ColorType, GMemTag, ObjectProfile, ObjectType, OmniMeasure, SystemObject};

/// Platform an entity lives on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Platform {
    Light,
    Switch,
    Cover,
    Climate,
    BinarySensor,
    Sensor,
    Number,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum LightVariant {
    Dimmable,
    /// A load group, rendered as a light group.
    Group,
    /// Colour load behind a DMX or DALI gateway.
    Color {
        color_type: ColorType,
        min_kelvin: u16,
        max_kelvin: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverClass {
    Curtain,
    Shade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinarySource {
    DryContact,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Illuminance,
    WindSpeed,
    Current,
    Power,
    /// Temperature reported by an OmniSensor.
    OmniTemperature,
}

impl SensorKind {
    pub fn unit(self) -> &'static str {
        match self {
            Self::Temperature | Self::OmniTemperature => "°C",
            Self::Illuminance => "lx",
            Self::WindSpeed => "m/s",
            Self::Current => "A",
            Self::Power => "W",
        }
    }

    /// Decimal places shown, when the sensor has a fixed precision.
    pub fn precision(self) -> Option<u8> {
        match self {
            Self::Current => Some(3),
            _ => None,
        }
    }

    pub fn is_omni(self) -> bool {
        matches!(self, Self::Current | Self::Power | Self::OmniTemperature)
    }
}

/// Range and step of a numeric variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumberRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    /// Stored on the controller as thousandths.
    pub fixed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
}

/// The entity category an object maps to, with the static detail its
/// projection needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum EntityKind {
    Light { light: LightVariant },
    Switch,
    Cover { device_class: CoverClass },
    Climate,
    BinarySensor { source: BinarySource },
    Sensor { sensor: SensorKind },
    Number { range: NumberRange },
    Text,
}

impl EntityKind {
    pub fn platform(&self) -> Platform {
        match self {
            Self::Light { .. } => Platform::Light,
            Self::Switch => Platform::Switch,
            Self::Cover { .. } => Platform::Cover,
            Self::Climate => Platform::Climate,
            Self::BinarySensor { .. } => Platform::BinarySensor,
            Self::Sensor { .. } => Platform::Sensor,
            Self::Number { .. } => Platform::Number,
            Self::Text => Platform::Text,
        }
    }

    /// Variable-derived entity.
    pub fn is_variable(&self) -> bool {
        matches!(
            self,
            Self::BinarySensor {
                source: BinarySource::Variable
            } | Self::Number { .. }
                | Self::Text
        )
    }

    /// Whether a freshly registered entity starts enabled.
    pub fn enabled_by_default(&self) -> bool {
        match self {
            Self::Sensor { sensor } => !sensor.is_omni(),
            other => !other.is_variable(),
        }
    }

    /// Whether a freshly registered entity starts hidden.
    pub fn hidden_by_default(&self) -> bool {
        self.is_variable()
    }
}

/// Decide which entity, if any, `object` becomes.
pub fn classify(object: &SystemObject) -> Option<EntityKind> {
    let profile = &object.profile;
    match &object.object_type {
        ObjectType::Load if profile.is_relay() || profile.is_motor() => Some(EntityKind::Switch),
        ObjectType::Load => Some(EntityKind::Light {
            light: LightVariant::Dimmable,
        }),
        ObjectType::LoadGroup => Some(EntityKind::Light {
            light: LightVariant::Group,
        }),
        ObjectType::RgbLoad => Some(EntityKind::Light {
            light: match profile {
                ObjectProfile::RgbLoad {
                    color_type,
                    min_kelvin,
                    max_kelvin,
                } => LightVariant::Color {
                    color_type: *color_type,
                    min_kelvin: *min_kelvin,
                    max_kelvin: *max_kelvin,
                },
                _ => LightVariant::Dimmable,
            },
        }),
        t if t.is_blind() || t.is_blind_group() => Some(EntityKind::Cover {
            device_class: match profile {
                ObjectProfile::Blind { shade_type } if shade_type == "Drapery" => {
                    CoverClass::Curtain
                }
                _ => CoverClass::Shade,
            },
        }),
        t if t.is_thermostat() => Some(EntityKind::Climate),
        ObjectType::DryContact => Some(EntityKind::BinarySensor {
            source: BinarySource::DryContact,
        }),
        ObjectType::Temperature => sensor(SensorKind::Temperature),
        ObjectType::LightSensor => sensor(SensorKind::Illuminance),
        ObjectType::AnemoSensor => sensor(SensorKind::WindSpeed),
        ObjectType::OmniSensor => match profile {
            ObjectProfile::OmniSensor { measure } => sensor(match measure {
                OmniMeasure::Current => SensorKind::Current,
                OmniMeasure::Power => SensorKind::Power,
                OmniMeasure::Temperature => SensorKind::OmniTemperature,
            }),
            _ => None,
        },
        ObjectType::GMem => match profile {
            ObjectProfile::GMem { tag, is_fixed } => classify_variable(*tag, *is_fixed),
            _ => None,
        },
        _ => None,
    }
}

fn sensor(sensor: SensorKind) -> Option<EntityKind> {
    Some(EntityKind::Sensor { sensor })
}

fn classify_variable(tag: GMemTag, fixed: bool) -> Option<EntityKind> {
    let (min, max, unit) = match tag {
        GMemTag::Bool => {
            return Some(EntityKind::BinarySensor {
                source: BinarySource::Variable,
            });
        }
        GMemTag::Text => return Some(EntityKind::Text),
        GMemTag::Unknown => return None,
        GMemTag::DeviceUnits => (0.0, 604_800.0, None),
        GMemTag::Level => (0.0, 100.0, Some("%")),
        GMemTag::Load | GMemTag::Task => (1.0, 10_000.0, None),
        GMemTag::Number => (f64::from(i32::MIN), f64::from(i32::MAX), None),
        GMemTag::Delay => (0.0, 86_400_000.0, Some("ms")),
        GMemTag::Seconds => (0.0, 604_800.0, Some("s")),
        GMemTag::DegC => (-40.0, 150.0, Some("°C")),
    };
    Some(EntityKind::Number {
        range: NumberRange {
            min,
            max,
            step: if fixed { 0.001 } else { 1.0 },
            fixed,
            unit,
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn load(load_type: &str) -> SystemObject {
        SystemObject::new(1, "L", ObjectType::Load).with_profile(ObjectProfile::Load {
            load_type: load_type.into(),
        })
    }

    #[test]
    fn relay_and_motor_loads_are_switches() {
        assert_eq!(classify(&load("High Voltage Relay")), Some(EntityKind::Switch));
        assert_eq!(classify(&load("Motor")), Some(EntityKind::Switch));
        assert_eq!(
            classify(&load("Incandescent")),
            Some(EntityKind::Light {
                light: LightVariant::Dimmable
            })
        );
    }

    #[test]
    fn every_blind_variant_is_a_cover() {
        for tag in [
            "Blind",
            "BlindGroup",
            "QISBlind",
            "QubeBlind",
            "RelayBlind",
            "Somfy.RS-485_Shade_CHILD",
            "Somfy.URTSI_2_Shade_CHILD",
        ] {
            let obj = SystemObject::new(2, "B", ObjectType::from(tag));
            assert_eq!(
                classify(&obj).map(|k| k.platform()),
                Some(Platform::Cover),
                "{tag}"
            );
        }

        let drapery = SystemObject::new(3, "D", ObjectType::Blind).with_profile(ObjectProfile::Blind {
            shade_type: "Drapery".into(),
        });
        assert_eq!(
            classify(&drapery),
            Some(EntityKind::Cover {
                device_class: CoverClass::Curtain
            })
        );

        let track = SystemObject::new(4, "T", ObjectType::Blind).with_profile(ObjectProfile::Blind {
            shade_type: "DraperyTrack".into(),
        });
        assert_eq!(
            classify(&track),
            Some(EntityKind::Cover {
                device_class: CoverClass::Shade
            })
        );
    }

    #[test]
    fn variables_by_tag() {
        let gmem = |tag, is_fixed| {
            SystemObject::new(9, "V", ObjectType::GMem)
                .with_profile(ObjectProfile::GMem { tag, is_fixed })
        };

        let bool_var = classify(&gmem(GMemTag::Bool, false)).unwrap();
        assert_eq!(bool_var.platform(), Platform::BinarySensor);
        assert!(!bool_var.enabled_by_default());
        assert!(bool_var.hidden_by_default());

        assert_eq!(classify(&gmem(GMemTag::Text, false)), Some(EntityKind::Text));
        assert_eq!(classify(&gmem(GMemTag::Unknown, false)), None);

        match classify(&gmem(GMemTag::Delay, true)) {
            Some(EntityKind::Number { range }) => {
                assert_eq!(range.max, 86_400_000.0);
                assert_eq!(range.step, 0.001);
                assert_eq!(range.unit, Some("ms"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match classify(&gmem(GMemTag::Number, false)) {
            Some(EntityKind::Number { range }) => {
                assert_eq!(range.min, -2_147_483_648.0);
                assert_eq!(range.max, 2_147_483_647.0);
                assert_eq!(range.step, 1.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn omni_sensors_are_disabled_by_default() {
        let omni = SystemObject::new(4, "Amps", ObjectType::OmniSensor).with_profile(
            ObjectProfile::OmniSensor {
                measure: OmniMeasure::Current,
            },
        );
        let kind = classify(&omni);
        assert_eq!(
            kind,
            Some(EntityKind::Sensor {
                sensor: SensorKind::Current
            })
        );
        assert!(kind.is_some_and(|k| !k.enabled_by_default()));

        let temp = SystemObject::new(5, "Temp", ObjectType::Temperature);
        assert!(classify(&temp).is_some_and(|k| k.enabled_by_default()));
    }

    #[test]
    fn topology_objects_are_not_entities() {
        for t in [
            ObjectType::Station,
            ObjectType::Button,
            ObjectType::Task,
            ObjectType::Master,
            ObjectType::Module,
            ObjectType::BackBox,
            ObjectType::Area,
            ObjectType::Other("Vantage.Mystery".into()),
        ] {
            assert_eq!(classify(&SystemObject::new(6, "X", t.clone())), None, "{t}");
        }
    }

    #[test]
    fn classification_is_total_over_platforms() {
        // Every platform is reachable from at least one object type.
        let samples = [
            SystemObject::new(1, "a", ObjectType::Load),
            load("Relay"),
            SystemObject::new(1, "c", ObjectType::Blind),
            SystemObject::new(1, "d", ObjectType::Thermostat),
            SystemObject::new(1, "e", ObjectType::DryContact),
            SystemObject::new(1, "f", ObjectType::LightSensor),
            SystemObject::new(1, "g", ObjectType::GMem).with_profile(ObjectProfile::GMem {
                tag: GMemTag::Level,
                is_fixed: false,
            }),
            SystemObject::new(1, "h", ObjectType::GMem).with_profile(ObjectProfile::GMem {
                tag: GMemTag::Text,
                is_fixed: false,
            }),
        ];
        let reached: Vec<Platform> = samples
            .iter()
            .filter_map(classify)
            .map(|k| k.platform())
            .collect();
        for platform in Platform::iter() {
            assert!(reached.contains(&platform), "{platform} unreachable");
        }
    }
}
