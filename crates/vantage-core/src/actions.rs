// ── Entity actions ──
//
// Translate what a user asks an entity to do into controller commands.
// Validation happens here, before anything is sent.

use serde::Deserialize;
use vantage_link::{ColorType, ObjectCommand, SystemObject, Value};

use crate::error::CoreError;
use crate::model::classify::{EntityKind, LightVariant};
use crate::model::project::{
    CLIMATE_MAX_TEMP, CLIMATE_MIN_TEMP, ClimateFanMode, EntityState, HvacMode, brightness_to_level,
};
use crate::model::Entity;

/// Something a user can ask an entity to do.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EntityAction {
    TurnOn {
        #[serde(default)]
        brightness: Option<u8>,
        /// Seconds.
        #[serde(default)]
        transition: Option<f64>,
        #[serde(default)]
        hs_color: Option<[f64; 2]>,
        #[serde(default)]
        rgb_color: Option<[u8; 3]>,
        #[serde(default)]
        rgbw_color: Option<[u8; 4]>,
        #[serde(default)]
        color_temp_kelvin: Option<u16>,
    },
    TurnOff {
        #[serde(default)]
        transition: Option<f64>,
    },
    OpenCover,
    CloseCover,
    StopCover,
    SetCoverPosition {
        position: u8,
    },
    SetHvacMode {
        hvac_mode: HvacMode,
    },
    SetFanMode {
        fan_mode: ClimateFanMode,
    },
    SetTemperature {
        #[serde(default)]
        temperature: Option<f64>,
        #[serde(default)]
        target_temp_low: Option<f64>,
        #[serde(default)]
        target_temp_high: Option<f64>,
    },
    SetValue {
        value: f64,
    },
    SetText {
        value: String,
    },
}

impl EntityAction {
    /// Plain turn-on with no arguments.
    pub fn turn_on() -> Self {
        Self::TurnOn {
            brightness: None,
            transition: None,
            hs_color: None,
            rgb_color: None,
            rgbw_color: None,
            color_temp_kelvin: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TurnOn { .. } => "turn_on",
            Self::TurnOff { .. } => "turn_off",
            Self::OpenCover => "open_cover",
            Self::CloseCover => "close_cover",
            Self::StopCover => "stop_cover",
            Self::SetCoverPosition { .. } => "set_cover_position",
            Self::SetHvacMode { .. } => "set_hvac_mode",
            Self::SetFanMode { .. } => "set_fan_mode",
            Self::SetTemperature { .. } => "set_temperature",
            Self::SetValue { .. } => "set_value",
            Self::SetText { .. } => "set_value",
        }
    }
}

/// Commands that carry out `action` on `entity`, in send order.
///
/// `object` is the entity's cached controller object; colour lights read
/// their last known colour from it.
pub fn commands_for(
    entity: &Entity,
    object: &SystemObject,
    action: &EntityAction,
) -> Result<Vec<ObjectCommand>, CoreError> {
    let vid = entity.vid;
    let commands = match (&entity.kind, action) {
        (
            EntityKind::Light { light },
            EntityAction::TurnOn {
                brightness,
                transition,
                hs_color,
                rgb_color,
                rgbw_color,
                color_temp_kelvin,
            },
        ) => {
            let level = brightness.map_or(100.0, brightness_to_level);
            let last_hs = object.state.hsl.map_or([0.0, 0.0], |[h, s, _]| [h, s]);
            match light {
                LightVariant::Dimmable | LightVariant::Group => vec![ObjectCommand::SetLevel {
                    vid,
                    level,
                    transition: *transition,
                }],
                LightVariant::Color {
                    color_type,
                    min_kelvin,
                    max_kelvin,
                } => match color_type {
                    ColorType::Hsl => {
                        let [hue, saturation] = hs_color.unwrap_or(last_hs);
                        vec![ObjectCommand::SetHsl {
                            vid,
                            hue,
                            saturation,
                            level,
                        }]
                    }
                    ColorType::Rgb => vec![ObjectCommand::SetRgb {
                        vid,
                        rgb: rgb_color.unwrap_or_else(|| hsv_to_rgb(last_hs[0], last_hs[1], level)),
                    }],
                    ColorType::Rgbw => vec![ObjectCommand::SetRgbw {
                        vid,
                        rgbw: rgbw_color.unwrap_or_else(|| {
                            let [r, g, b] = hsv_to_rgb(last_hs[0], last_hs[1], level);
                            [r, g, b, scale_to_byte(level)]
                        }),
                    }],
                    ColorType::Cct => {
                        let mut commands = Vec::with_capacity(2);
                        if let Some(kelvin) = color_temp_kelvin {
                            if !(*min_kelvin..=*max_kelvin).contains(kelvin) {
                                return Err(invalid(format!(
                                    "colour temperature {kelvin}K outside {min_kelvin}..={max_kelvin}K"
                                )));
                            }
                            commands.push(ObjectCommand::SetColorTemp {
                                vid,
                                kelvin: *kelvin,
                            });
                        }
                        commands.push(ObjectCommand::SetLevel {
                            vid,
                            level,
                            transition: *transition,
                        });
                        commands
                    }
                },
            }
        }
        (EntityKind::Light { .. } | EntityKind::Switch, EntityAction::TurnOff { transition }) => {
            vec![ObjectCommand::TurnOff {
                vid,
                transition: *transition,
            }]
        }
        (EntityKind::Switch, EntityAction::TurnOn { .. }) => vec![ObjectCommand::SetLevel {
            vid,
            level: 100.0,
            transition: None,
        }],

        (EntityKind::Cover { .. }, EntityAction::OpenCover) => vec![ObjectCommand::OpenBlind { vid }],
        (EntityKind::Cover { .. }, EntityAction::CloseCover) => vec![ObjectCommand::CloseBlind { vid }],
        (EntityKind::Cover { .. }, EntityAction::StopCover) => vec![ObjectCommand::StopBlind { vid }],
        (EntityKind::Cover { .. }, EntityAction::SetCoverPosition { position }) => {
            if *position > 100 {
                return Err(invalid(format!("cover position {position} outside 0..=100")));
            }
            vec![ObjectCommand::SetBlindPosition {
                vid,
                position: f64::from(*position),
            }]
        }

        (EntityKind::Climate, EntityAction::SetHvacMode { hvac_mode }) => {
            vec![ObjectCommand::SetOperationMode {
                vid,
                mode: (*hvac_mode).into(),
            }]
        }
        (EntityKind::Climate, EntityAction::SetFanMode { fan_mode }) => {
            vec![ObjectCommand::SetFanMode {
                vid,
                mode: (*fan_mode).into(),
            }]
        }
        (
            EntityKind::Climate,
            EntityAction::SetTemperature {
                temperature,
                target_temp_low,
                target_temp_high,
            },
        ) => set_temperature(entity, *temperature, *target_temp_low, *target_temp_high)?,

        (EntityKind::Number { range }, EntityAction::SetValue { value }) => {
            if !value.is_finite() || *value < range.min || *value > range.max {
                return Err(invalid(format!(
                    "value {value} outside {}..={}",
                    range.min, range.max
                )));
            }
            let raw = if range.fixed { *value * 1000.0 } else { *value };
            vec![ObjectCommand::SetVariable {
                vid,
                value: Value::Int(nearest_int(raw)),
            }]
        }
        (EntityKind::Text, EntityAction::SetText { value }) => vec![ObjectCommand::SetVariable {
            vid,
            value: Value::Text(value.clone()),
        }],

        (kind, action) => {
            return Err(invalid(format!(
                "{} is not supported by {} entities",
                action.name(),
                kind.platform()
            )));
        }
    };
    Ok(commands)
}

fn set_temperature(
    entity: &Entity,
    temperature: Option<f64>,
    low: Option<f64>,
    high: Option<f64>,
) -> Result<Vec<ObjectCommand>, CoreError> {
    let vid = entity.vid;
    let mode = match &entity.state {
        EntityState::Climate(climate) => climate.hvac_mode,
        _ => None,
    };
    for t in [temperature, low, high].into_iter().flatten() {
        if !(CLIMATE_MIN_TEMP..=CLIMATE_MAX_TEMP).contains(&t) {
            return Err(invalid(format!(
                "temperature {t} outside {CLIMATE_MIN_TEMP}..={CLIMATE_MAX_TEMP}°C"
            )));
        }
    }

    match (mode, temperature, low, high) {
        (Some(HvacMode::HeatCool), _, Some(low), Some(high)) => {
            if low > high {
                return Err(invalid(format!("low {low} is above high {high}")));
            }
            Ok(vec![
                ObjectCommand::SetCoolSetPoint { vid, celsius: high },
                ObjectCommand::SetHeatSetPoint { vid, celsius: low },
            ])
        }
        (Some(HvacMode::Heat), Some(t), _, _) => {
            Ok(vec![ObjectCommand::SetHeatSetPoint { vid, celsius: t }])
        }
        (Some(HvacMode::Cool), Some(t), _, _) => {
            Ok(vec![ObjectCommand::SetCoolSetPoint { vid, celsius: t }])
        }
        (mode, ..) => Err(invalid(format!(
            "set_temperature arguments do not fit hvac mode {}",
            mode.map_or_else(|| "unknown".to_owned(), |m| m.to_string())
        ))),
    }
}

fn invalid(message: String) -> CoreError {
    CoreError::ValidationFailed { message }
}

/// Hue (degrees), saturation and value (percent) to 8-bit RGB.
fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> [u8; 3] {
    let h = hue.rem_euclid(360.0) / 60.0;
    let s = (saturation / 100.0).clamp(0.0, 1.0);
    let v = (value / 100.0).clamp(0.0, 1.0);
    let c = v * s;
    let x = c * (1.0 - ((h % 2.0) - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match h {
        h if h < 1.0 => (c, x, 0.0),
        h if h < 2.0 => (x, c, 0.0),
        h if h < 3.0 => (0.0, c, x),
        h if h < 4.0 => (0.0, x, c),
        h if h < 5.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [
        scale_to_byte((r + m) * 100.0),
        scale_to_byte((g + m) * 100.0),
        scale_to_byte((b + m) * 100.0),
    ]
}

/// A 0..=100 percentage to 0..=255.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn scale_to_byte(percent: f64) -> u8 {
    (percent / 100.0 * 255.0).round().clamp(0.0, 255.0) as u8
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn nearest_int(value: f64) -> i64 {
    value.round() as i64
}
