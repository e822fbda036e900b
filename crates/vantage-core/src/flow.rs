// ── Config flows ──
//
// Interactive setup as a sequence of steps. Each step either asks for
// more input (a form), creates an entry, or aborts with a reason. Front
// ends render forms however they like; the flow only decides what comes
// next.

use std::collections::BTreeMap;
use std::sync::Arc;

use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, info};
use vantage_link::{ControllerDetails, ControllerProbe, Credentials, DEFAULT_USERNAME};

use crate::discovery::DiscoveredController;
use crate::entry::{ConfigEntries, ConfigEntry, EntryData};
use crate::hub::{EntryState, Hub};

// ── Results ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FlowStep {
    User,
    ZeroconfConfirm,
    Auth,
    ReauthConfirm,
    Reconfigure,
}

/// Error shown on a re-displayed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FormError {
    CannotConnect,
    InvalidAuth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AbortReason {
    AlreadyConfigured,
    CannotConnect,
    Unknown,
    ReauthSuccessful,
    ReconfigureSuccessful,
    WrongController,
}

#[derive(Debug, Clone)]
pub enum FlowResult {
    Form {
        step: FlowStep,
        error: Option<FormError>,
        /// Values for the form's description, e.g. `host`.
        placeholders: BTreeMap<&'static str, String>,
        /// Pre-filled username for login forms.
        suggested_username: Option<String>,
    },
    CreateEntry(Box<ConfigEntry>),
    Abort(AbortReason),
}

impl FlowResult {
    fn form(step: FlowStep) -> Self {
        Self::Form {
            step,
            error: None,
            placeholders: BTreeMap::new(),
            suggested_username: None,
        }
    }

    #[must_use]
    fn with_error(mut self, value: Option<FormError>) -> Self {
        if let Self::Form { error, .. } = &mut self {
            *error = value;
        }
        self
    }

    #[must_use]
    fn with_host(mut self, host: &str) -> Self {
        if let Self::Form { placeholders, .. } = &mut self {
            placeholders.insert("host", host.to_owned());
        }
        self
    }

    #[must_use]
    fn with_username(mut self, username: impl Into<String>) -> Self {
        if let Self::Form {
            suggested_username, ..
        } = &mut self
        {
            *suggested_username = Some(username.into());
        }
        self
    }

    pub fn step(&self) -> Option<FlowStep> {
        match self {
            Self::Form { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            Self::Abort(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Username and password typed into a login form.
#[derive(Debug, Clone)]
pub struct AuthInput {
    pub username: String,
    pub password: SecretString,
}

impl AuthInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// Check a login against `host`, as a form error.
async fn check_login(
    probe: &dyn ControllerProbe,
    host: &str,
    input: &AuthInput,
    ssl: bool,
) -> Option<FormError> {
    match probe
        .validate_credentials(host, &input.username, &input.password, ssl)
        .await
    {
        Ok(true) => None,
        Ok(false) => Some(FormError::InvalidAuth),
        Err(err) => {
            debug!(host, error = %err, "credential check could not reach controller");
            Some(FormError::CannotConnect)
        }
    }
}

// ── Setup flow ───────────────────────────────────────────────────────

/// Adds a new controller, started by the user or by discovery.
pub struct ConfigFlow {
    probe: Arc<dyn ControllerProbe>,
    entries: Arc<ConfigEntries>,
    controller: Option<ControllerDetails>,
    credentials: Option<Credentials>,
}

impl ConfigFlow {
    pub fn new(probe: Arc<dyn ControllerProbe>, entries: Arc<ConfigEntries>) -> Self {
        Self {
            probe,
            entries,
            controller: None,
            credentials: None,
        }
    }

    /// Manual setup. `None` shows the host form.
    pub async fn step_user(&mut self, host: Option<&str>) -> FlowResult {
        let Some(host) = host else {
            return FlowResult::form(FlowStep::User);
        };
        if self.entries.find_by_host(host).is_some() {
            return FlowResult::Abort(AbortReason::AlreadyConfigured);
        }

        match self.probe.details(host).await {
            Ok(Some(details)) => {
                let requires_auth = details.requires_auth;
                self.controller = Some(details);
                if requires_auth {
                    self.step_auth(None).await
                } else {
                    self.finish().await
                }
            }
            Ok(None) | Err(_) => {
                FlowResult::form(FlowStep::User).with_error(Some(FormError::CannotConnect))
            }
        }
    }

    /// Setup offered by mDNS discovery.
    pub async fn step_zeroconf(&mut self, discovered: &DiscoveredController) -> FlowResult {
        let Some(serial) = discovered.serial_number.as_deref() else {
            return FlowResult::Abort(AbortReason::Unknown);
        };
        if self.update_known_host(serial, &discovered.host) {
            return FlowResult::Abort(AbortReason::AlreadyConfigured);
        }

        match self.probe.details(&discovered.host).await {
            Ok(Some(details)) => {
                let requires_auth = details.requires_auth;
                self.controller = Some(details);
                if requires_auth {
                    self.step_auth(None).await
                } else {
                    self.step_zeroconf_confirm(false).await
                }
            }
            Ok(None) | Err(_) => FlowResult::Abort(AbortReason::CannotConnect),
        }
    }

    /// Confirm a discovered controller that needs no login.
    pub async fn step_zeroconf_confirm(&mut self, confirmed: bool) -> FlowResult {
        let Some(controller) = &self.controller else {
            return FlowResult::Abort(AbortReason::Unknown);
        };
        if !confirmed {
            return FlowResult::form(FlowStep::ZeroconfConfirm).with_host(&controller.host);
        }
        self.finish().await
    }

    /// Collect credentials. `None` shows the login form.
    pub async fn step_auth(&mut self, input: Option<AuthInput>) -> FlowResult {
        let Some(controller) = self.controller.clone() else {
            return FlowResult::Abort(AbortReason::Unknown);
        };
        let form = FlowResult::form(FlowStep::Auth).with_host(&controller.host);
        let Some(input) = input else {
            return form.with_username(DEFAULT_USERNAME);
        };

        match check_login(self.probe.as_ref(), &controller.host, &input, controller.supports_ssl).await {
            None => {
                self.credentials = Some(input.credentials());
                self.finish().await
            }
            error => form.with_error(error).with_username(input.username),
        }
    }

    /// Read the serial number and create the entry.
    async fn finish(&mut self) -> FlowResult {
        let Some(controller) = self.controller.clone() else {
            return FlowResult::Abort(AbortReason::Unknown);
        };
        let serial = match self
            .probe
            .serial_number(&controller.host, self.credentials.as_ref(), controller.supports_ssl)
            .await
        {
            Ok(serial) => serial,
            Err(err) => {
                debug!(host = %controller.host, error = %err, "could not read serial number");
                return FlowResult::Abort(AbortReason::CannotConnect);
            }
        };
        if self.update_known_host(&serial, &controller.host) {
            return FlowResult::Abort(AbortReason::AlreadyConfigured);
        }

        let data = EntryData {
            host: controller.host.clone(),
            ssl: controller.supports_ssl,
            username: self.credentials.as_ref().map(|c| c.username.clone()),
            password: self.credentials.as_ref().map(|c| c.password.clone()),
        };
        let entry = ConfigEntry::new(serial, data);
        if self.entries.add(entry.clone()).is_err() {
            return FlowResult::Abort(AbortReason::AlreadyConfigured);
        }
        info!(entry_id = %entry.entry_id, host = %controller.host, "config entry created");
        FlowResult::CreateEntry(Box::new(entry))
    }

    /// If `serial` already has an entry, point it at `host`.
    fn update_known_host(&self, serial: &str, host: &str) -> bool {
        let Some(existing) = self.entries.find_by_unique_id(serial) else {
            return false;
        };
        if existing.data.host != host {
            info!(entry_id = %existing.entry_id, host, "controller moved; updating host");
            let _ = self
                .entries
                .update(&existing.entry_id, |e| e.data.host = host.to_owned());
        }
        true
    }
}

// ── Re-authentication ────────────────────────────────────────────────

/// Replaces the credentials of an entry the controller started rejecting.
pub struct ReauthFlow {
    probe: Arc<dyn ControllerProbe>,
    hub: Hub,
    entry: ConfigEntry,
}

impl ReauthFlow {
    /// `None` when the entry does not exist.
    pub fn new(probe: Arc<dyn ControllerProbe>, hub: Hub, entry_id: &str) -> Option<Self> {
        let entry = hub.entries().get(entry_id)?;
        Some(Self { probe, hub, entry })
    }

    pub async fn step_reauth(&mut self) -> FlowResult {
        self.step_reauth_confirm(None).await
    }

    /// `None` shows the login form, pre-filled with the stored username.
    pub async fn step_reauth_confirm(&mut self, input: Option<AuthInput>) -> FlowResult {
        let form = FlowResult::form(FlowStep::ReauthConfirm).with_host(&self.entry.data.host);
        let Some(input) = input else {
            return form.with_username(
                self.entry
                    .data
                    .username
                    .clone()
                    .unwrap_or_else(|| DEFAULT_USERNAME.to_owned()),
            );
        };

        let data = &self.entry.data;
        if let Some(error) = check_login(self.probe.as_ref(), &data.host, &input, data.ssl).await {
            return form.with_error(Some(error)).with_username(input.username);
        }

        let entry_id = self.entry.entry_id.clone();
        if self
            .hub
            .entries()
            .update(&entry_id, |e| {
                e.data.username = Some(input.username.clone());
                e.data.password = Some(input.password.clone());
            })
            .is_err()
        {
            return FlowResult::Abort(AbortReason::Unknown);
        }
        info!(entry_id, "credentials updated");
        reload_if_active(&self.hub, &entry_id).await;
        FlowResult::Abort(AbortReason::ReauthSuccessful)
    }
}

// ── Reconfiguration ──────────────────────────────────────────────────

/// New connection settings for an existing entry.
#[derive(Debug, Clone, Default)]
pub struct ReconfigureInput {
    pub host: String,
    /// Replaces the stored login when set.
    pub auth: Option<AuthInput>,
}

/// Changes an entry's connection settings. The entry id, unique id and
/// devices survive; only the same physical controller is accepted.
pub struct ReconfigureFlow {
    probe: Arc<dyn ControllerProbe>,
    hub: Hub,
    entry: ConfigEntry,
}

impl ReconfigureFlow {
    pub fn new(probe: Arc<dyn ControllerProbe>, hub: Hub, entry_id: &str) -> Option<Self> {
        let entry = hub.entries().get(entry_id)?;
        Some(Self { probe, hub, entry })
    }

    /// `None` shows the form with the current host.
    pub async fn step_reconfigure(&mut self, input: Option<ReconfigureInput>) -> FlowResult {
        let form = FlowResult::form(FlowStep::Reconfigure).with_host(&self.entry.data.host);
        let Some(input) = input else {
            return match &self.entry.data.username {
                Some(username) => form.with_username(username.clone()),
                None => form,
            };
        };

        let details = match self.probe.details(&input.host).await {
            Ok(Some(details)) => details,
            Ok(None) | Err(_) => return form.with_error(Some(FormError::CannotConnect)),
        };
        let credentials = match &input.auth {
            Some(auth) => {
                if let Some(error) =
                    check_login(self.probe.as_ref(), &input.host, auth, details.supports_ssl).await
                {
                    return form.with_error(Some(error)).with_username(auth.username.clone());
                }
                Some(auth.credentials())
            }
            None => self.entry.data.credentials(),
        };

        let serial = match self
            .probe
            .serial_number(&input.host, credentials.as_ref(), details.supports_ssl)
            .await
        {
            Ok(serial) => serial,
            Err(err) if err.is_auth_failure() => {
                return form.with_error(Some(FormError::InvalidAuth));
            }
            Err(_) => return form.with_error(Some(FormError::CannotConnect)),
        };
        if self.entry.unique_id.as_deref() != Some(serial.as_str()) {
            return FlowResult::Abort(AbortReason::WrongController);
        }

        let entry_id = self.entry.entry_id.clone();
        let updated = self.hub.entries().update(&entry_id, |e| {
            e.data.host.clone_from(&input.host);
            e.data.ssl = details.supports_ssl;
            if let Some(credentials) = credentials {
                e.data.username = Some(credentials.username);
                e.data.password = Some(credentials.password);
            }
        });
        if updated.is_err() {
            return FlowResult::Abort(AbortReason::Unknown);
        }
        info!(entry_id, host = %input.host, "entry reconfigured");
        reload_if_active(&self.hub, &entry_id).await;
        FlowResult::Abort(AbortReason::ReconfigureSuccessful)
    }
}

/// Reload an entry the hub is running or retrying. Entries that were
/// never set up stay that way.
async fn reload_if_active(hub: &Hub, entry_id: &str) {
    if hub.state(entry_id).await == EntryState::NotLoaded {
        return;
    }
    if let Err(err) = hub.reload(entry_id).await {
        debug!(entry_id, error = %err, "reload after flow failed");
    }
}
