// ── Outbound object commands ──
//
// Every write a session can issue. Commands are delivered at most once:
// the link never retries them on its own.

use serde::{Deserialize, Serialize};

use crate::object::Vid;
use crate::state::{FanMode, OperationMode, Value};

/// A command addressed to a single controller object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ObjectCommand {
    // ── Loads ────────────────────────────────────────────────────────
    /// Ramp to `level` (0..=100) over `transition` seconds.
    SetLevel {
        vid: Vid,
        level: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transition: Option<f64>,
    },
    TurnOff {
        vid: Vid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transition: Option<f64>,
    },
    SetHsl {
        vid: Vid,
        hue: f64,
        saturation: f64,
        level: f64,
    },
    SetRgb {
        vid: Vid,
        rgb: [u8; 3],
    },
    SetRgbw {
        vid: Vid,
        rgbw: [u8; 4],
    },
    SetColorTemp {
        vid: Vid,
        kelvin: u16,
    },

    // ── Shades ───────────────────────────────────────────────────────
    OpenBlind {
        vid: Vid,
    },
    CloseBlind {
        vid: Vid,
    },
    StopBlind {
        vid: Vid,
    },
    SetBlindPosition {
        vid: Vid,
        position: f64,
    },

    // ── Thermostats ──────────────────────────────────────────────────
    SetOperationMode {
        vid: Vid,
        mode: OperationMode,
    },
    SetFanMode {
        vid: Vid,
        mode: FanMode,
    },
    SetHeatSetPoint {
        vid: Vid,
        celsius: f64,
    },
    SetCoolSetPoint {
        vid: Vid,
        celsius: f64,
    },

    // ── Variables ────────────────────────────────────────────────────
    SetVariable {
        vid: Vid,
        value: Value,
    },

    // ── Tasks ────────────────────────────────────────────────────────
    StartTask {
        vid: Vid,
    },
    StopTask {
        vid: Vid,
    },
}

impl ObjectCommand {
    /// The object this command targets.
    pub fn vid(&self) -> Vid {
        match self {
            Self::SetLevel { vid, .. }
            | Self::TurnOff { vid, .. }
            | Self::SetHsl { vid, .. }
            | Self::SetRgb { vid, .. }
            | Self::SetRgbw { vid, .. }
            | Self::SetColorTemp { vid, .. }
            | Self::OpenBlind { vid }
            | Self::CloseBlind { vid }
            | Self::StopBlind { vid }
            | Self::SetBlindPosition { vid, .. }
            | Self::SetOperationMode { vid, .. }
            | Self::SetFanMode { vid, .. }
            | Self::SetHeatSetPoint { vid, .. }
            | Self::SetCoolSetPoint { vid, .. }
            | Self::SetVariable { vid, .. }
            | Self::StartTask { vid }
            | Self::StopTask { vid } => *vid,
        }
    }

    /// Short name for logs, e.g. `"start_task"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetLevel { .. } => "set_level",
            Self::TurnOff { .. } => "turn_off",
            Self::SetHsl { .. } => "set_hsl",
            Self::SetRgb { .. } => "set_rgb",
            Self::SetRgbw { .. } => "set_rgbw",
            Self::SetColorTemp { .. } => "set_color_temp",
            Self::OpenBlind { .. } => "open_blind",
            Self::CloseBlind { .. } => "close_blind",
            Self::StopBlind { .. } => "stop_blind",
            Self::SetBlindPosition { .. } => "set_blind_position",
            Self::SetOperationMode { .. } => "set_operation_mode",
            Self::SetFanMode { .. } => "set_fan_mode",
            Self::SetHeatSetPoint { .. } => "set_heat_set_point",
            Self::SetCoolSetPoint { .. } => "set_cool_set_point",
            Self::SetVariable { .. } => "set_variable",
            Self::StartTask { .. } => "start_task",
            Self::StopTask { .. } => "stop_task",
        }
    }
}
