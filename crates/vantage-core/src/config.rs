// ── Runtime bridge configuration ──
//
// These types describe how the bridge behaves: timeouts, reconnect and
// setup-retry pacing, stale-entity grace, and task name resolution.
// The CLI (via vantage-config) builds a `BridgeConfig` and hands it in;
// core never reads config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vantage_link::{LinkConfig, ReconnectConfig};

/// What a task lookup by name does when several tasks share the name.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskNamePolicy {
    /// Fail with an ambiguity error and send nothing.
    #[default]
    Reject,
    /// Use the task with the lowest id.
    First,
}

/// Bridge-wide tuning shared by every config entry.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bound on opening a session and reading the object directory.
    pub connect_timeout: Duration,
    /// Bound on a single command. Expiry is a command failure.
    pub command_timeout: Duration,
    /// Pacing of in-session reconnects after transport loss.
    pub reconnect: ReconnectConfig,
    /// Pacing of setup retries after a connection failure at setup.
    pub setup_retry: ReconnectConfig,
    /// How long a stale entity is kept before removal. Zero removes at once.
    pub stale_grace: Duration,
    /// How often stale entities are swept.
    pub sweep_interval: Duration,
    pub task_name_policy: TaskNamePolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            setup_retry: ReconnectConfig {
                initial_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(300),
                max_retries: None,
            },
            stale_grace: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
            task_name_policy: TaskNamePolicy::Reject,
        }
    }
}

impl BridgeConfig {
    /// Link settings derived from this config.
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
            reconnect: self.reconnect.clone(),
        }
    }
}
