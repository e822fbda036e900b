// ── Transport seams ──
//
// The wire protocol is behind these traits. `Connector` opens sessions,
// `Session` is one authenticated connection, `ControllerProbe` answers the
// pre-setup questions a config flow asks, and `LinkFactory` builds
// connectors from persisted connection parameters.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::auth::{ConnectParams, Credentials};
use crate::command::ObjectCommand;
use crate::error::Error;
use crate::event::LinkEvent;
use crate::object::SystemObject;

/// Identity of a connected controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerInfo {
    /// Stable hardware identifier; used to detect re-adding the same controller.
    pub serial_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// What can be learned about a controller before logging in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerDetails {
    pub host: String,
    pub requires_auth: bool,
    pub supports_ssl: bool,
}

/// Opens authenticated sessions against one controller.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;

    /// Connect and authenticate.
    async fn open(&self) -> Result<Box<dyn Session>, Error>;
}

/// One live, authenticated connection.
///
/// All methods take `&self` so the link loop can read events and send
/// commands from a single task.
#[async_trait]
pub trait Session: Send + Sync {
    fn info(&self) -> &ControllerInfo;

    /// Enumerate the full object directory.
    async fn directory(&self) -> Result<Vec<SystemObject>, Error>;

    /// Wait for the next push notification. `Ok(None)` means the controller
    /// closed the session cleanly. Must be cancel-safe.
    async fn next_event(&self) -> Result<Option<LinkEvent>, Error>;

    /// Deliver one command.
    async fn send(&self, command: &ObjectCommand) -> Result<(), Error>;

    async fn close(&self);
}

/// Pre-setup queries used by config flows.
#[async_trait]
pub trait ControllerProbe: Send + Sync {
    /// `Ok(None)` when nothing answers at `host`.
    async fn details(&self, host: &str) -> Result<Option<ControllerDetails>, Error>;

    /// `Ok(false)` for wrong credentials, `Err` when the controller is unreachable.
    async fn validate_credentials(
        &self,
        host: &str,
        username: &str,
        password: &SecretString,
        ssl: bool,
    ) -> Result<bool, Error>;

    /// Log in and read the controller's serial number.
    async fn serial_number(
        &self,
        host: &str,
        credentials: Option<&Credentials>,
        ssl: bool,
    ) -> Result<String, Error>;
}

/// Builds connectors for persisted connection parameters.
pub trait LinkFactory: Send + Sync {
    fn connector(&self, params: &ConnectParams) -> Arc<dyn Connector>;
}
