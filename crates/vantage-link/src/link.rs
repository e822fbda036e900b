//! Supervised controller link with auto-reconnect.
//!
//! Owns one session at a time, fans its push notifications out through a
//! [`tokio::sync::broadcast`] channel, and drains a single outbound command
//! queue on the same task. On transport loss it broadcasts one
//! [`LinkEvent::Disconnected`], fails commands until a new session is up,
//! and reconnects with exponential backoff + jitter.
//!
//! # Example
//!
//! ```rust,ignore
//! use vantage_link::link::{LinkConfig, LinkHandle};
//! use tokio_util::sync::CancellationToken;
//!
//! let est = LinkHandle::connect(connector, LinkConfig::default(), CancellationToken::new()).await?;
//! let mut rx = est.handle.subscribe();
//! est.handle.start();
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::command::ObjectCommand;
use crate::error::Error;
use crate::event::LinkEvent;
use crate::object::SystemObject;
use crate::transport::{Connector, ControllerInfo, Session};

// ── Channel capacities ───────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const COMMAND_CHANNEL_CAPACITY: usize = 64;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── LinkConfig ───────────────────────────────────────────────────────

/// Timeouts and reconnect policy for one link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Bound on open + directory fetch. Expiry is a connection failure.
    pub connect_timeout: Duration,
    /// Bound on a single command delivery. Expiry is reported, never retried.
    pub command_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ── LinkState ────────────────────────────────────────────────────────

/// Observable state of the link loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Reconnecting { attempt: u32 },
    /// The controller rejected our credentials on reconnect. Not retried.
    AuthFailed,
    /// Reconnect budget exhausted.
    Failed,
    Closed,
}

// ── Command envelope ─────────────────────────────────────────────────

struct CommandEnvelope {
    command: ObjectCommand,
    response_tx: oneshot::Sender<Result<(), Error>>,
}

// ── LinkHandle ───────────────────────────────────────────────────────

/// Result of a successful [`LinkHandle::connect`].
pub struct Established {
    pub handle: LinkHandle,
    pub info: ControllerInfo,
    /// Directory enumerated on the first session.
    pub objects: Vec<SystemObject>,
}

/// Handle to a running link loop.
///
/// The loop is spawned paused so consumers can [`subscribe`](Self::subscribe)
/// before the first event is read; call [`start`](Self::start) to release it.
pub struct LinkHandle {
    event_tx: broadcast::Sender<Arc<LinkEvent>>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    state: watch::Receiver<LinkState>,
    start_tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LinkHandle {
    /// Open the first session, enumerate the directory, and spawn the loop.
    ///
    /// Setup failures (unreachable, rejected credentials, timeout) are
    /// returned to the caller; only losses after this point are retried.
    pub async fn connect(
        connector: Arc<dyn Connector>,
        config: LinkConfig,
        cancel: CancellationToken,
    ) -> Result<Established, Error> {
        tracing::info!(endpoint = %connector.endpoint(), "Connecting to controller");

        let (session, objects) = open_session(connector.as_ref(), &config).await?;
        let info = session.info().clone();

        tracing::info!(
            serial = %info.serial_number,
            objects = objects.len(),
            "Controller session established"
        );

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (state_tx, state) = watch::channel(LinkState::Connected);
        let (start_tx, start_rx) = oneshot::channel();

        let task = tokio::spawn(link_loop(LoopContext {
            connector,
            session,
            event_tx: event_tx.clone(),
            command_rx,
            state_tx,
            config,
            cancel: cancel.clone(),
            start_rx,
        }));

        Ok(Established {
            handle: Self {
                event_tx,
                command_tx,
                state,
                start_tx: std::sync::Mutex::new(Some(start_tx)),
                cancel,
                task: Mutex::new(Some(task)),
            },
            info,
            objects,
        })
    }

    /// Get a new receiver for the event stream.
    ///
    /// If a consumer falls behind, it receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LinkEvent>> {
        self.event_tx.subscribe()
    }

    /// Release the paused loop. Idempotent.
    pub fn start(&self) {
        let sender = match self.start_tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = sender {
            let _ = tx.send(());
        }
    }

    /// Watch the loop's connection state.
    pub fn state(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == LinkState::Connected
    }

    /// Deliver a command and wait for the controller's verdict.
    ///
    /// Fails fast with [`Error::NotConnected`] between sessions. Nothing is
    /// queued for later and nothing is retried.
    pub async fn send(&self, command: ObjectCommand) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(CommandEnvelope {
                command,
                response_tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;

        response_rx.await.map_err(|_| Error::NotConnected)?
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

// ── Background loop ──────────────────────────────────────────────────

struct LoopContext {
    connector: Arc<dyn Connector>,
    session: Box<dyn Session>,
    event_tx: broadcast::Sender<Arc<LinkEvent>>,
    command_rx: mpsc::Receiver<CommandEnvelope>,
    state_tx: watch::Sender<LinkState>,
    config: LinkConfig,
    cancel: CancellationToken,
    start_rx: oneshot::Receiver<()>,
}

enum SessionEnd {
    Cancelled,
    Lost(String),
}

/// Main loop: run session → on loss, backoff → reconnect.
async fn link_loop(ctx: LoopContext) {
    let LoopContext {
        connector,
        mut session,
        event_tx,
        mut command_rx,
        state_tx,
        config,
        cancel,
        start_rx,
    } = ctx;

    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            session.close().await;
            let _ = state_tx.send(LinkState::Closed);
            return;
        }
        started = start_rx => {
            if started.is_err() {
                tracing::debug!("Link handle dropped before start");
                session.close().await;
                let _ = state_tx.send(LinkState::Closed);
                return;
            }
        }
    }

    loop {
        let end = run_session(session.as_ref(), &event_tx, &mut command_rx, &config, &cancel).await;
        session.close().await;

        let reason = match end {
            SessionEnd::Cancelled => break,
            SessionEnd::Lost(reason) => reason,
        };

        tracing::warn!(reason = %reason, "Controller session lost");
        let _ = event_tx.send(Arc::new(LinkEvent::Disconnected { reason }));

        match reconnect(connector.as_ref(), &mut command_rx, &state_tx, &config, &cancel).await {
            Reconnect::Established(new_session, objects) => {
                tracing::info!(objects = objects.len(), "Controller session re-established");
                session = new_session;
                let _ = state_tx.send(LinkState::Connected);
                let _ = event_tx.send(Arc::new(LinkEvent::Reconnected { objects }));
            }
            Reconnect::Cancelled => break,
            Reconnect::GaveUp(state) => {
                let _ = state_tx.send(state);
                fail_pending(&mut command_rx);
                tracing::debug!("Link loop exiting");
                return;
            }
        }
    }

    let _ = state_tx.send(LinkState::Closed);
    fail_pending(&mut command_rx);
    tracing::debug!("Link loop exiting");
}

// ── Single session lifecycle ─────────────────────────────────────────

/// Read events and deliver commands until the session drops.
async fn run_session(
    session: &dyn Session,
    event_tx: &broadcast::Sender<Arc<LinkEvent>>,
    command_rx: &mut mpsc::Receiver<CommandEnvelope>,
    config: &LinkConfig,
    cancel: &CancellationToken,
) -> SessionEnd {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return SessionEnd::Cancelled,
            envelope = command_rx.recv() => {
                let Some(envelope) = envelope else {
                    // Every handle is gone.
                    return SessionEnd::Cancelled;
                };
                let result = deliver(session, &envelope.command, config.command_timeout).await;
                let lost = match &result {
                    Err(e) if e.is_connection_loss() => Some(e.to_string()),
                    _ => None,
                };
                let _ = envelope.response_tx.send(result);
                if let Some(reason) = lost {
                    return SessionEnd::Lost(reason);
                }
            }
            event = session.next_event() => {
                match event {
                    Ok(Some(event)) => {
                        tracing::trace!(?event, "Link event");
                        // No subscribers is fine.
                        let _ = event_tx.send(Arc::new(event));
                    }
                    Ok(None) => return SessionEnd::Lost("closed by controller".into()),
                    Err(e) => return SessionEnd::Lost(e.to_string()),
                }
            }
        }
    }
}

async fn deliver(
    session: &dyn Session,
    command: &ObjectCommand,
    timeout: Duration,
) -> Result<(), Error> {
    tracing::debug!(command = command.name(), vid = %command.vid(), "Sending command");
    match tokio::time::timeout(timeout, session.send(command)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            timeout_secs: timeout.as_secs(),
        }),
    }
}

// ── Reconnection ─────────────────────────────────────────────────────

enum Reconnect {
    Established(Box<dyn Session>, Vec<SystemObject>),
    Cancelled,
    GaveUp(LinkState),
}

async fn reconnect(
    connector: &dyn Connector,
    command_rx: &mut mpsc::Receiver<CommandEnvelope>,
    state_tx: &watch::Sender<LinkState>,
    config: &LinkConfig,
    cancel: &CancellationToken,
) -> Reconnect {
    let mut attempt: u32 = 0;

    loop {
        if let Some(max) = config.reconnect.max_retries {
            if attempt >= max {
                tracing::error!(max_retries = max, "Reconnection limit reached, giving up");
                return Reconnect::GaveUp(LinkState::Failed);
            }
        }

        let delay = calculate_backoff(attempt, &config.reconnect);
        attempt += 1;
        let _ = state_tx.send(LinkState::Reconnecting { attempt });
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "Waiting before reconnect"
        );

        if !wait_rejecting(delay, command_rx, cancel).await {
            return Reconnect::Cancelled;
        }

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return Reconnect::Cancelled,
            opened = open_session(connector, config) => opened,
        };

        match opened {
            Ok((session, objects)) => return Reconnect::Established(session, objects),
            Err(e) if e.is_auth_failure() => {
                tracing::error!(error = %e, "Controller rejected credentials on reconnect");
                return Reconnect::GaveUp(LinkState::AuthFailed);
            }
            Err(e) => tracing::warn!(error = %e, attempt, "Reconnect attempt failed"),
        }
    }
}

/// Sleep for `delay`, failing any command that arrives meanwhile.
/// Returns `false` if cancelled.
async fn wait_rejecting(
    delay: Duration,
    command_rx: &mut mpsc::Receiver<CommandEnvelope>,
    cancel: &CancellationToken,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return false,
            () = &mut sleep => return true,
            envelope = command_rx.recv() => {
                let Some(envelope) = envelope else { return false };
                let _ = envelope.response_tx.send(Err(Error::NotConnected));
            }
        }
    }
}

fn fail_pending(command_rx: &mut mpsc::Receiver<CommandEnvelope>) {
    command_rx.close();
    while let Ok(envelope) = command_rx.try_recv() {
        let _ = envelope.response_tx.send(Err(Error::NotConnected));
    }
}

/// Open + enumerate under the connect timeout.
async fn open_session(
    connector: &dyn Connector,
    config: &LinkConfig,
) -> Result<(Box<dyn Session>, Vec<SystemObject>), Error> {
    let attempt = async {
        let session = connector.open().await?;
        match session.directory().await {
            Ok(objects) => Ok((session, objects)),
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    };

    tokio::time::timeout(config.connect_timeout, attempt)
        .await
        .map_err(|_| Error::Timeout {
            timeout_secs: config.connect_timeout.as_secs(),
        })?
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple bridges.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
