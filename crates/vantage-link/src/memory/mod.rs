//! In-process simulated controllers.
//!
//! [`MemoryController`] behaves like one controller on the network: it
//! holds an object directory, authenticates logins, echoes state changes
//! for the commands it accepts, and pushes notifications to whichever
//! session is currently open. Test code (or a fixture script) drives it
//! through methods like [`push_update`](MemoryController::push_update) and
//! [`drop_connection`](MemoryController::drop_connection).
//!
//! [`MemoryNetwork`] maps hosts to controllers and implements both
//! [`LinkFactory`] and [`ControllerProbe`], so the whole stack above the
//! link can run against it unchanged.

mod fixture;

pub use fixture::{ControllerFixture, ScriptAction, ScriptStep};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{ConnectParams, Credentials};
use crate::command::ObjectCommand;
use crate::error::Error;
use crate::event::LinkEvent;
use crate::object::{SystemObject, Vid};
use crate::state::{ObjectState, Value};
use crate::transport::{
    Connector, ControllerDetails, ControllerInfo, ControllerProbe, LinkFactory, Session,
};

// ── Session signalling ───────────────────────────────────────────────

enum SessionSignal {
    Event(LinkEvent),
    Drop(String),
}

struct Login {
    username: String,
    password: SecretString,
}

struct State {
    objects: IndexMap<Vid, SystemObject>,
    session: Option<(u64, mpsc::UnboundedSender<SessionSignal>)>,
    next_session_id: u64,
    sent: Vec<ObjectCommand>,
    reachable: bool,
    reject_commands: bool,
    command_latency: Option<Duration>,
    login: Option<Login>,
}

// ── MemoryController ─────────────────────────────────────────────────

/// One simulated controller.
pub struct MemoryController {
    host: String,
    info: ControllerInfo,
    supports_ssl: bool,
    script: Vec<ScriptStep>,
    state: Mutex<State>,
}

impl MemoryController {
    /// A reachable controller with authentication disabled.
    pub fn new(host: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            info: ControllerInfo {
                serial_number: serial_number.into(),
                firmware_version: None,
                model: None,
            },
            supports_ssl: true,
            script: Vec::new(),
            state: Mutex::new(State {
                objects: IndexMap::new(),
                session: None,
                next_session_id: 1,
                sent: Vec::new(),
                reachable: true,
                reject_commands: false,
                command_latency: None,
                login: None,
            }),
        }
    }

    /// Require this login on every session.
    #[must_use]
    pub fn with_login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.state.get_mut().login = Some(Login {
            username: username.into(),
            password: SecretString::from(password.into()),
        });
        self
    }

    #[must_use]
    pub fn with_objects(mut self, objects: impl IntoIterator<Item = SystemObject>) -> Self {
        let map = &mut self.state.get_mut().objects;
        for object in objects {
            map.insert(object.vid, object);
        }
        self
    }

    #[must_use]
    pub fn with_ssl(mut self, supports_ssl: bool) -> Self {
        self.supports_ssl = supports_ssl;
        self
    }

    pub fn from_fixture(fixture: ControllerFixture) -> Self {
        let mut controller = Self::new(fixture.host, fixture.serial_number)
            .with_objects(fixture.objects)
            .with_ssl(fixture.supports_ssl);
        controller.info.firmware_version = fixture.firmware_version;
        controller.info.model = fixture.model;
        controller.script = fixture.script;
        if fixture.requires_auth {
            if let Some(password) = fixture.password {
                controller = controller.with_login(fixture.username, password);
            }
        }
        controller
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        ControllerFixture::load(path).map(Self::from_fixture)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn info(&self) -> &ControllerInfo {
        &self.info
    }

    pub async fn details(&self) -> ControllerDetails {
        ControllerDetails {
            host: self.host.clone(),
            requires_auth: self.state.lock().await.login.is_some(),
            supports_ssl: self.supports_ssl,
        }
    }

    // ── Driving the simulation ──────────────────────────────────────

    /// Merge `changes` into the object and notify the open session.
    pub async fn push_update(&self, vid: Vid, changes: ObjectState) {
        let mut state = self.state.lock().await;
        if let Some(object) = state.objects.get_mut(&vid) {
            object.state.merge(&changes);
        }
        notify(&mut state, LinkEvent::ObjectUpdated { vid, changes });
    }

    pub async fn add_object(&self, object: SystemObject) {
        let mut state = self.state.lock().await;
        state.objects.insert(object.vid, object.clone());
        notify(&mut state, LinkEvent::ObjectAdded { object });
    }

    pub async fn delete_object(&self, vid: Vid) {
        let mut state = self.state.lock().await;
        state.objects.shift_remove(&vid);
        notify(&mut state, LinkEvent::ObjectDeleted { vid });
    }

    /// Remove an object from the directory without telling anyone, as a
    /// reprogram between sessions would.
    pub async fn forget_object(&self, vid: Vid) {
        self.state.lock().await.objects.shift_remove(&vid);
    }

    pub async fn mark_unreachable(&self, vid: Vid) {
        let mut state = self.state.lock().await;
        notify(&mut state, LinkEvent::ObjectUnreachable { vid });
    }

    /// Kill the open session, if any.
    pub async fn drop_connection(&self, reason: impl Into<String>) {
        let mut state = self.state.lock().await;
        if let Some((id, tx)) = state.session.take() {
            tracing::debug!(host = %self.host, session = id, "Simulated connection drop");
            let _ = tx.send(SessionSignal::Drop(reason.into()));
        }
    }

    /// Take the controller off the network. Going unreachable also drops
    /// the open session.
    pub async fn set_reachable(&self, reachable: bool) {
        let mut state = self.state.lock().await;
        state.reachable = reachable;
        if !reachable {
            if let Some((_, tx)) = state.session.take() {
                let _ = tx.send(SessionSignal::Drop("host unreachable".into()));
            }
        }
    }

    pub async fn set_login(&self, username: impl Into<String>, password: impl Into<String>) {
        self.state.lock().await.login = Some(Login {
            username: username.into(),
            password: SecretString::from(password.into()),
        });
    }

    pub async fn set_reject_commands(&self, reject: bool) {
        self.state.lock().await.reject_commands = reject;
    }

    /// Delay every command delivery by `latency`.
    pub async fn set_command_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.command_latency = latency;
    }

    // ── Inspection ──────────────────────────────────────────────────

    /// Every command delivered so far, oldest first.
    pub async fn sent_commands(&self) -> Vec<ObjectCommand> {
        self.state.lock().await.sent.clone()
    }

    /// Number of sessions opened so far.
    pub async fn session_count(&self) -> u64 {
        self.state.lock().await.next_session_id - 1
    }

    pub async fn object(&self, vid: Vid) -> Option<SystemObject> {
        self.state.lock().await.objects.get(&vid).cloned()
    }

    pub async fn objects(&self) -> Vec<SystemObject> {
        self.state.lock().await.objects.values().cloned().collect()
    }

    // ── Script replay ───────────────────────────────────────────────

    /// Replay the fixture script in the background. Steps fire relative to
    /// the previous step; the task ends with the script or on cancel.
    pub fn spawn_script(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            for step in controller.script.clone() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(step.after) => {}
                }
                controller.apply(step.action).await;
            }
            tracing::debug!(host = %controller.host, "Fixture script finished");
        })
    }

    async fn apply(&self, action: ScriptAction) {
        match action {
            ScriptAction::Update { vid, changes } => self.push_update(vid, changes).await,
            ScriptAction::Add { object } => self.add_object(object).await,
            ScriptAction::Delete { vid } => self.delete_object(vid).await,
            ScriptAction::Unreachable { vid } => self.mark_unreachable(vid).await,
            ScriptAction::Drop { reason } => self.drop_connection(reason).await,
        }
    }

    // ── Session plumbing ────────────────────────────────────────────

    async fn open_session(
        self: &Arc<Self>,
        credentials: Option<&Credentials>,
    ) -> Result<MemorySession, Error> {
        let mut state = self.state.lock().await;
        if !state.reachable {
            return Err(Error::Connect {
                host: self.host.clone(),
                reason: "host unreachable".into(),
            });
        }
        check_login(state.login.as_ref(), credentials)?;

        let id = state.next_session_id;
        state.next_session_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        // Replacing the sender closes the previous session's stream.
        state.session = Some((id, tx));

        Ok(MemorySession {
            controller: Arc::clone(self),
            id,
            info: self.info.clone(),
            rx: Mutex::new(rx),
        })
    }

    async fn execute(&self, session_id: u64, command: &ObjectCommand) -> Result<(), Error> {
        let latency = {
            let state = self.state.lock().await;
            ensure_current(&state, session_id)?;
            state.command_latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        ensure_current(&state, session_id)?;
        if state.reject_commands {
            return Err(Error::Rejected {
                message: format!("{} refused", command.name()),
            });
        }
        let vid = command.vid();
        if !state.objects.contains_key(&vid) {
            return Err(Error::InvalidObject { vid });
        }

        state.sent.push(command.clone());
        for (target, changes) in echo(&state.objects, command) {
            if let Some(object) = state.objects.get_mut(&target) {
                object.state.merge(&changes);
            }
            notify(
                &mut state,
                LinkEvent::ObjectUpdated {
                    vid: target,
                    changes,
                },
            );
        }
        Ok(())
    }
}

fn notify(state: &mut State, event: LinkEvent) {
    if let Some((_, tx)) = &state.session {
        if tx.send(SessionSignal::Event(event)).is_err() {
            state.session = None;
        }
    }
}

fn ensure_current(state: &State, session_id: u64) -> Result<(), Error> {
    match &state.session {
        Some((id, _)) if *id == session_id => Ok(()),
        _ => Err(Error::ConnectionClosed {
            reason: "session no longer open".into(),
        }),
    }
}

fn check_login(expected: Option<&Login>, given: Option<&Credentials>) -> Result<(), Error> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let Some(given) = given else {
        return Err(Error::LoginRequired);
    };
    if given.username == expected.username
        && given.password.expose_secret() == expected.password.expose_secret()
    {
        Ok(())
    } else {
        Err(Error::Authentication {
            message: format!("invalid login for user {}", given.username),
        })
    }
}

/// State changes the controller reports back after accepting `command`.
fn echo(objects: &IndexMap<Vid, SystemObject>, command: &ObjectCommand) -> Vec<(Vid, ObjectState)> {
    let vid = command.vid();
    let changes = match command {
        ObjectCommand::SetLevel { level, .. } => ObjectState {
            level: Some(level.clamp(0.0, 100.0)),
            ..ObjectState::default()
        },
        ObjectCommand::TurnOff { .. } => ObjectState {
            level: Some(0.0),
            ..ObjectState::default()
        },
        ObjectCommand::SetHsl {
            hue,
            saturation,
            level,
            ..
        } => ObjectState {
            hsl: Some([*hue, *saturation, *level]),
            level: Some(*level),
            ..ObjectState::default()
        },
        ObjectCommand::SetRgb { rgb, .. } => ObjectState {
            rgb: Some(*rgb),
            ..ObjectState::default()
        },
        ObjectCommand::SetRgbw { rgbw, .. } => ObjectState {
            rgbw: Some(*rgbw),
            ..ObjectState::default()
        },
        ObjectCommand::SetColorTemp { kelvin, .. } => ObjectState {
            color_temp: Some(*kelvin),
            ..ObjectState::default()
        },
        ObjectCommand::OpenBlind { .. } => ObjectState {
            position: Some(100.0),
            ..ObjectState::default()
        },
        ObjectCommand::CloseBlind { .. } => ObjectState {
            position: Some(0.0),
            ..ObjectState::default()
        },
        ObjectCommand::StopBlind { .. } => return Vec::new(),
        ObjectCommand::SetBlindPosition { position, .. } => ObjectState {
            position: Some(position.clamp(0.0, 100.0)),
            ..ObjectState::default()
        },
        ObjectCommand::SetOperationMode { mode, .. } => ObjectState {
            operation_mode: Some(*mode),
            ..ObjectState::default()
        },
        ObjectCommand::SetFanMode { mode, .. } => ObjectState {
            fan_mode: Some(*mode),
            ..ObjectState::default()
        },
        // Set points live on child temperature objects: cool at 3, heat at 4.
        ObjectCommand::SetCoolSetPoint { celsius, .. } => {
            return set_point_echo(objects, vid, 3, *celsius);
        }
        ObjectCommand::SetHeatSetPoint { celsius, .. } => {
            return set_point_echo(objects, vid, 4, *celsius);
        }
        ObjectCommand::SetVariable { value, .. } => ObjectState {
            value: Some(value.clone()),
            ..ObjectState::default()
        },
        ObjectCommand::StartTask { .. } => ObjectState {
            running: Some(true),
            ..ObjectState::default()
        },
        ObjectCommand::StopTask { .. } => ObjectState {
            running: Some(false),
            ..ObjectState::default()
        },
    };
    vec![(vid, changes)]
}

fn set_point_echo(
    objects: &IndexMap<Vid, SystemObject>,
    thermostat: Vid,
    position: u32,
    celsius: f64,
) -> Vec<(Vid, ObjectState)> {
    objects
        .values()
        .find(|o| o.parent.is_some_and(|p| p.vid == thermostat && p.position == position))
        .map(|child| {
            vec![(
                child.vid,
                ObjectState {
                    value: Some(Value::Float(celsius)),
                    ..ObjectState::default()
                },
            )]
        })
        .unwrap_or_default()
}

// ── MemorySession ────────────────────────────────────────────────────

struct MemorySession {
    controller: Arc<MemoryController>,
    id: u64,
    info: ControllerInfo,
    rx: Mutex<mpsc::UnboundedReceiver<SessionSignal>>,
}

#[async_trait]
impl Session for MemorySession {
    fn info(&self) -> &ControllerInfo {
        &self.info
    }

    async fn directory(&self) -> Result<Vec<SystemObject>, Error> {
        let state = self.controller.state.lock().await;
        ensure_current(&state, self.id)?;
        Ok(state.objects.values().cloned().collect())
    }

    async fn next_event(&self) -> Result<Option<LinkEvent>, Error> {
        match self.rx.lock().await.recv().await {
            Some(SessionSignal::Event(event)) => Ok(Some(event)),
            Some(SessionSignal::Drop(reason)) => Err(Error::ConnectionClosed { reason }),
            None => Ok(None),
        }
    }

    async fn send(&self, command: &ObjectCommand) -> Result<(), Error> {
        self.controller.execute(self.id, command).await
    }

    async fn close(&self) {
        let mut state = self.controller.state.lock().await;
        if matches!(&state.session, Some((id, _)) if *id == self.id) {
            state.session = None;
        }
    }
}

// ── Connectors ───────────────────────────────────────────────────────

struct MemoryConnector {
    controller: Arc<MemoryController>,
    params: ConnectParams,
}

#[async_trait]
impl Connector for MemoryConnector {
    fn endpoint(&self) -> String {
        let scheme = if self.params.ssl { "tls" } else { "tcp" };
        format!("{scheme}://{} (simulated)", self.params.host)
    }

    async fn open(&self) -> Result<Box<dyn Session>, Error> {
        let session = self
            .controller
            .open_session(self.params.credentials.as_ref())
            .await?;
        Ok(Box::new(session))
    }
}

/// Connector for a host nothing answers on.
struct UnreachableConnector {
    host: String,
}

#[async_trait]
impl Connector for UnreachableConnector {
    fn endpoint(&self) -> String {
        self.host.clone()
    }

    async fn open(&self) -> Result<Box<dyn Session>, Error> {
        Err(Error::Connect {
            host: self.host.clone(),
            reason: "no controller at this address".into(),
        })
    }
}

// ── MemoryNetwork ────────────────────────────────────────────────────

/// A set of simulated controllers addressed by host.
#[derive(Default, Clone)]
pub struct MemoryNetwork {
    controllers: HashMap<String, Arc<MemoryController>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_controller(mut self, controller: Arc<MemoryController>) -> Self {
        self.insert(controller);
        self
    }

    pub fn insert(&mut self, controller: Arc<MemoryController>) {
        self.controllers
            .insert(controller.host().to_owned(), controller);
    }

    pub fn get(&self, host: &str) -> Option<&Arc<MemoryController>> {
        self.controllers.get(host)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Arc<MemoryController>> {
        self.controllers.values()
    }

    fn reachable(&self, host: &str) -> Result<&Arc<MemoryController>, Error> {
        self.controllers.get(host).ok_or_else(|| Error::Connect {
            host: host.to_owned(),
            reason: "no controller at this address".into(),
        })
    }
}

impl LinkFactory for MemoryNetwork {
    fn connector(&self, params: &ConnectParams) -> Arc<dyn Connector> {
        match self.controllers.get(&params.host) {
            Some(controller) => Arc::new(MemoryConnector {
                controller: Arc::clone(controller),
                params: params.clone(),
            }),
            None => Arc::new(UnreachableConnector {
                host: params.host.clone(),
            }),
        }
    }
}

#[async_trait]
impl ControllerProbe for MemoryNetwork {
    async fn details(&self, host: &str) -> Result<Option<ControllerDetails>, Error> {
        let Some(controller) = self.controllers.get(host) else {
            return Ok(None);
        };
        if !controller.state.lock().await.reachable {
            return Ok(None);
        }
        Ok(Some(controller.details().await))
    }

    async fn validate_credentials(
        &self,
        host: &str,
        username: &str,
        password: &SecretString,
        _ssl: bool,
    ) -> Result<bool, Error> {
        let controller = self.reachable(host)?;
        let state = controller.state.lock().await;
        if !state.reachable {
            return Err(Error::Connect {
                host: host.to_owned(),
                reason: "host unreachable".into(),
            });
        }
        let given = Credentials {
            username: username.to_owned(),
            password: password.clone(),
        };
        Ok(check_login(state.login.as_ref(), Some(&given)).is_ok())
    }

    async fn serial_number(
        &self,
        host: &str,
        credentials: Option<&Credentials>,
        _ssl: bool,
    ) -> Result<String, Error> {
        let controller = self.reachable(host)?;
        let state = controller.state.lock().await;
        if !state.reachable {
            return Err(Error::Connect {
                host: host.to_owned(),
                reason: "host unreachable".into(),
            });
        }
        check_login(state.login.as_ref(), credentials)?;
        Ok(controller.info.serial_number.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::object::{ObjectType, SystemObject};

    fn controller() -> Arc<MemoryController> {
        Arc::new(
            MemoryController::new("10.0.0.5", "4242")
                .with_login("administrator", "secret")
                .with_objects([
                    SystemObject::new(10, "Lobby", ObjectType::Load),
                    SystemObject::new(20, "Thermostat", ObjectType::Thermostat),
                    SystemObject::new(21, "Cool SP", ObjectType::Temperature).with_parent(20, 3),
                    SystemObject::new(22, "Heat SP", ObjectType::Temperature).with_parent(20, 4),
                ]),
        )
    }

    fn params(password: &str) -> ConnectParams {
        ConnectParams::new("10.0.0.5").with_credentials(Credentials::new("administrator", password))
    }

    #[tokio::test]
    async fn login_is_checked() {
        let network = MemoryNetwork::new().with_controller(controller());

        let err = network
            .connector(&ConnectParams::new("10.0.0.5"))
            .open()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::LoginRequired));

        let err = network.connector(&params("nope")).open().await.err().unwrap();
        assert!(err.is_auth_failure());

        assert!(network.connector(&params("secret")).open().await.is_ok());
    }

    #[tokio::test]
    async fn unknown_host_is_unreachable() {
        let network = MemoryNetwork::new();
        let err = network
            .connector(&ConnectParams::new("10.9.9.9"))
            .open()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Connect { .. }));
        assert!(network.details("10.9.9.9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commands_echo_state_changes() {
        let ctrl = controller();
        let network = MemoryNetwork::new().with_controller(Arc::clone(&ctrl));
        let session = network.connector(&params("secret")).open().await.unwrap();

        session
            .send(&ObjectCommand::SetLevel {
                vid: Vid(10),
                level: 55.0,
                transition: None,
            })
            .await
            .unwrap();

        let event = session.next_event().await.unwrap().unwrap();
        assert_eq!(
            event,
            LinkEvent::ObjectUpdated {
                vid: Vid(10),
                changes: ObjectState {
                    level: Some(55.0),
                    ..ObjectState::default()
                }
            }
        );
        assert_eq!(ctrl.object(Vid(10)).await.unwrap().state.level, Some(55.0));
    }

    #[tokio::test]
    async fn set_points_echo_on_child_objects() {
        let ctrl = controller();
        let network = MemoryNetwork::new().with_controller(Arc::clone(&ctrl));
        let session = network.connector(&params("secret")).open().await.unwrap();

        session
            .send(&ObjectCommand::SetHeatSetPoint {
                vid: Vid(20),
                celsius: 21.5,
            })
            .await
            .unwrap();

        let event = session.next_event().await.unwrap().unwrap();
        assert_eq!(event.vid(), Some(Vid(22)));
    }

    #[tokio::test]
    async fn unknown_vid_is_invalid_object() {
        let network = MemoryNetwork::new().with_controller(controller());
        let session = network.connector(&params("secret")).open().await.unwrap();
        let err = session
            .send(&ObjectCommand::StartTask { vid: Vid(999) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidObject { vid: Vid(999) }));
    }

    #[tokio::test]
    async fn newer_session_supersedes_older_one() {
        let ctrl = controller();
        let network = MemoryNetwork::new().with_controller(Arc::clone(&ctrl));
        let first = network.connector(&params("secret")).open().await.unwrap();
        let _second = network.connector(&params("secret")).open().await.unwrap();

        assert!(first.next_event().await.unwrap().is_none());
        assert!(matches!(
            first.send(&ObjectCommand::StopBlind { vid: Vid(10) }).await,
            Err(Error::ConnectionClosed { .. })
        ));
        assert_eq!(ctrl.session_count().await, 2);
    }

    #[tokio::test]
    async fn probe_answers_config_flow_questions() {
        let network = MemoryNetwork::new().with_controller(controller());

        let details = network.details("10.0.0.5").await.unwrap().unwrap();
        assert!(details.requires_auth);

        let good = SecretString::from("secret".to_owned());
        let bad = SecretString::from("wrong".to_owned());
        assert!(network.validate_credentials("10.0.0.5", "administrator", &good, true).await.unwrap());
        assert!(!network.validate_credentials("10.0.0.5", "administrator", &bad, true).await.unwrap());
        assert!(network.validate_credentials("10.0.0.6", "administrator", &good, true).await.is_err());

        let creds = Credentials::new("administrator", "secret");
        assert_eq!(
            network.serial_number("10.0.0.5", Some(&creds), true).await.unwrap(),
            "4242"
        );
    }
}
