// ── Hub ──
//
// Owns every config entry's lifecycle within one process: setup with
// retry, unload, reload, and the process-wide event bus each entry fires
// onto. Entry state is observable per entry through a watch channel.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vantage_link::{LinkFactory, SystemObject, Vid, link::calculate_backoff};

use crate::actions::EntityAction;
use crate::config::BridgeConfig;
use crate::entry::ConfigEntries;
use crate::error::{CoreError, ErrorKind};
use crate::events::EventBus;
use crate::migrate::migrate_entry;
use crate::model::{BusEvent, Directory};
use crate::runtime::EntryRuntime;
use crate::services::{TaskCall, TaskService, TaskTarget, resolve_across};

// ── EntryState ───────────────────────────────────────────────────────

/// Where a config entry is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, strum::Display)]
#[serde(tag = "state", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntryState {
    NotLoaded,
    Loaded,
    /// Setup failed `attempt` times with a connection failure; retrying.
    SetupRetry { attempt: u32 },
    /// Setup failed in a way retrying will not fix.
    SetupError { reason: String },
}

struct Slot {
    state: watch::Sender<EntryState>,
    runtime: Option<EntryRuntime>,
    cancel: CancellationToken,
    retry: Option<JoinHandle<()>>,
    reauth: bool,
    /// Held for the whole of `setup` so overlapping calls run one at a time.
    setup_lock: Arc<Mutex<()>>,
}

impl Slot {
    fn new(cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(EntryState::NotLoaded);
        Self {
            state,
            runtime: None,
            cancel,
            retry: None,
            reauth: false,
            setup_lock: Arc::new(Mutex::new(())),
        }
    }

    fn set(&self, state: EntryState) {
        self.state.send_replace(state);
    }
}

// ── Hub ──────────────────────────────────────────────────────────────

/// Cheaply cloneable; every clone drives the same entries.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    factory: Arc<dyn LinkFactory>,
    entries: Arc<ConfigEntries>,
    config: ArcSwap<BridgeConfig>,
    bus: EventBus,
    slots: Mutex<HashMap<String, Slot>>,
    cancel: CancellationToken,
}

impl Hub {
    pub fn new(
        factory: Arc<dyn LinkFactory>,
        entries: Arc<ConfigEntries>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            inner: Arc::new(HubInner {
                factory,
                entries,
                config: ArcSwap::from_pointee(config),
                bus: EventBus::new(),
                slots: Mutex::new(HashMap::new()),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn entries(&self) -> &Arc<ConfigEntries> {
        &self.inner.entries
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Arc<BusEvent>> {
        self.inner.bus.subscribe()
    }

    pub fn config(&self) -> Arc<BridgeConfig> {
        self.inner.config.load_full()
    }

    /// Replace the bridge config. Entries pick it up on their next setup.
    pub fn set_config(&self, config: BridgeConfig) {
        self.inner.config.store(Arc::new(config));
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Set up one entry.
    ///
    /// A connection failure leaves the entry in `SetupRetry` with a
    /// background retry running; rejected credentials leave it in
    /// `SetupError` flagged for re-authentication. Only an unknown entry
    /// id is an `Err`.
    pub async fn setup(&self, entry_id: &str) -> Result<EntryState, CoreError> {
        self.inner.entries.update(entry_id, |entry| {
            migrate_entry(entry);
        })?;

        let setup_lock = {
            let mut slots = self.inner.slots.lock().await;
            Arc::clone(&self.slot_mut(&mut slots, entry_id).setup_lock)
        };
        let _setting_up = setup_lock.lock().await;

        let cancel = {
            let mut slots = self.inner.slots.lock().await;
            let slot = self.slot_mut(&mut slots, entry_id);
            if slot.runtime.is_some() || slot.retry.is_some() {
                debug!(entry_id, "entry already set up");
                return Ok(slot.state.borrow().clone());
            }
            slot.cancel.clone()
        };

        let state = self.attempt(entry_id, 0, &cancel).await;
        if let EntryState::SetupRetry { .. } = state {
            let mut slots = self.inner.slots.lock().await;
            if let Some(slot) = slots.get_mut(entry_id) {
                if !cancel.is_cancelled() && slot.retry.is_none() {
                    slot.retry = Some(tokio::spawn(retry_loop(
                        self.clone(),
                        entry_id.to_owned(),
                        cancel,
                    )));
                }
            }
        }
        Ok(state)
    }

    /// Set up every known entry. Returns each entry's resulting state.
    pub async fn setup_all(&self) -> Vec<(String, EntryState)> {
        let mut states = Vec::new();
        for entry_id in self.inner.entries.ids() {
            match self.setup(&entry_id).await {
                Ok(state) => states.push((entry_id, state)),
                Err(err) => warn!(entry_id, error = %err, "entry vanished during setup"),
            }
        }
        states
    }

    /// Stop an entry's runtime and any pending retry. Returns whether
    /// anything was running.
    pub async fn unload(&self, entry_id: &str) -> bool {
        let (runtime, retry, cancel) = {
            let mut slots = self.inner.slots.lock().await;
            let Some(slot) = slots.get_mut(entry_id) else {
                return false;
            };
            let cancel = std::mem::replace(&mut slot.cancel, self.inner.cancel.child_token());
            slot.set(EntryState::NotLoaded);
            (slot.runtime.take(), slot.retry.take(), cancel)
        };

        cancel.cancel();
        let was_running = runtime.is_some() || retry.is_some();
        if let Some(runtime) = runtime {
            self.register_devices(&runtime);
            runtime.teardown().await;
        }
        if let Some(retry) = retry {
            let _ = retry.await;
        }
        if was_running {
            info!(entry_id, "entry unloaded");
        }
        was_running
    }

    /// Unload, then set up again with the entry's current data.
    pub async fn reload(&self, entry_id: &str) -> Result<EntryState, CoreError> {
        self.unload(entry_id).await;
        self.setup(entry_id).await
    }

    /// Unload and forget an entry.
    pub async fn remove(&self, entry_id: &str) -> Result<(), CoreError> {
        self.unload(entry_id).await;
        self.inner.slots.lock().await.remove(entry_id);
        self.inner
            .entries
            .remove(entry_id)
            .map(|_| ())
            .ok_or_else(|| CoreError::EntryNotFound {
                entry_id: entry_id.to_owned(),
            })
    }

    /// Unload every entry.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.inner.slots.lock().await.keys().cloned().collect();
        for entry_id in ids {
            self.unload(&entry_id).await;
        }
        self.inner.cancel.cancel();
    }

    // ── Observation ──────────────────────────────────────────────────

    pub async fn state(&self, entry_id: &str) -> EntryState {
        self.inner
            .slots
            .lock()
            .await
            .get(entry_id)
            .map_or(EntryState::NotLoaded, |slot| slot.state.borrow().clone())
    }

    /// Watch an entry's state. `None` for an unknown entry.
    pub async fn state_changes(&self, entry_id: &str) -> Option<watch::Receiver<EntryState>> {
        self.inner.entries.get(entry_id)?;
        let mut slots = self.inner.slots.lock().await;
        Some(self.slot_mut(&mut slots, entry_id).state.subscribe())
    }

    /// The controller rejected this entry's credentials.
    pub async fn needs_reauth(&self, entry_id: &str) -> bool {
        self.inner
            .slots
            .lock()
            .await
            .get(entry_id)
            .is_some_and(|slot| slot.reauth || slot.runtime.as_ref().is_some_and(EntryRuntime::needs_reauth))
    }

    pub async fn runtime(&self, entry_id: &str) -> Option<EntryRuntime> {
        self.inner
            .slots
            .lock()
            .await
            .get(entry_id)
            .and_then(|slot| slot.runtime.clone())
    }

    /// Every loaded entry, in entry order.
    pub async fn runtimes(&self) -> Vec<EntryRuntime> {
        let slots = self.inner.slots.lock().await;
        self.inner
            .entries
            .ids()
            .iter()
            .filter_map(|id| slots.get(id).and_then(|slot| slot.runtime.clone()))
            .collect()
    }

    // ── Services ─────────────────────────────────────────────────────

    /// Run a task service. Without an entry id the selector is resolved
    /// across every loaded entry.
    pub async fn call_task(
        &self,
        service: TaskService,
        call: &TaskCall,
    ) -> Result<TaskTarget, CoreError> {
        let selector = call.selector()?;
        if let Some(entry_id) = call.entry_id.as_deref() {
            return self.loaded(entry_id).await?.call_task(service, &selector).await;
        }

        let runtimes = self.runtimes().await;
        let lists: Vec<(String, Vec<SystemObject>)> = runtimes
            .iter()
            .map(|rt| (rt.entry_id().to_owned(), rt.store().tasks()))
            .collect();
        let target = resolve_across(&lists, &selector, self.config().task_name_policy)?;
        let runtime = runtimes
            .into_iter()
            .find(|rt| rt.entry_id() == target.entry_id)
            .ok_or_else(|| CoreError::Internal(format!("entry {} vanished", target.entry_id)))?;
        runtime.run_task(service, target.task_id).await
    }

    /// Carry out an entity action on one entry.
    pub async fn execute(
        &self,
        entry_id: &str,
        vid: Vid,
        action: &EntityAction,
    ) -> Result<(), CoreError> {
        self.loaded(entry_id).await?.execute(vid, action).await
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn slot_mut<'a>(&self, slots: &'a mut HashMap<String, Slot>, entry_id: &str) -> &'a mut Slot {
        slots
            .entry(entry_id.to_owned())
            .or_insert_with(|| Slot::new(self.inner.cancel.child_token()))
    }

    async fn loaded(&self, entry_id: &str) -> Result<EntryRuntime, CoreError> {
        let slots = self.inner.slots.lock().await;
        if let Some(runtime) = slots.get(entry_id).and_then(|slot| slot.runtime.clone()) {
            return Ok(runtime);
        }
        if self.inner.entries.get(entry_id).is_none() {
            return Err(CoreError::EntryNotFound {
                entry_id: entry_id.to_owned(),
            });
        }
        let state = slots
            .get(entry_id)
            .map_or(EntryState::NotLoaded, |slot| slot.state.borrow().clone());
        Err(CoreError::EntryNotLoaded {
            entry_id: entry_id.to_owned(),
            state: state.to_string(),
        })
    }

    /// One setup attempt after `failures` earlier failures.
    async fn attempt(&self, entry_id: &str, failures: u32, cancel: &CancellationToken) -> EntryState {
        let Some(entry) = self.inner.entries.get(entry_id) else {
            return EntryState::NotLoaded;
        };
        let config = self.config();
        let connector = self.inner.factory.connector(&entry.data.connect_params());

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return EntryState::NotLoaded,
            result = EntryRuntime::setup(
                entry_id,
                connector,
                config.as_ref().clone(),
                self.inner.bus.clone(),
                cancel.child_token(),
            ) => result,
        };

        let mut slots = self.inner.slots.lock().await;
        if cancel.is_cancelled() || !slots.contains_key(entry_id) {
            drop(slots);
            if let Ok(runtime) = result {
                runtime.teardown().await;
            }
            return EntryState::NotLoaded;
        }
        let Some(slot) = slots.get_mut(entry_id) else {
            return EntryState::NotLoaded;
        };

        let mut extra = None;
        let state = match result {
            Ok(runtime) if slot.runtime.is_some() => {
                warn!(entry_id, "entry already loaded; closing the extra connection");
                extra = Some(runtime);
                EntryState::Loaded
            }
            Ok(runtime) => {
                self.register_devices(&runtime);
                slot.runtime = Some(runtime);
                slot.reauth = false;
                EntryState::Loaded
            }
            Err(err) if err.is_auth_failure() => {
                error!(entry_id, error = %err, "controller rejected credentials; re-authentication required");
                slot.reauth = true;
                EntryState::SetupError {
                    reason: err.to_string(),
                }
            }
            Err(err) if err.kind() == ErrorKind::ConnectionFailure => {
                let attempt = failures.saturating_add(1);
                warn!(entry_id, attempt, error = %err, "entry setup failed; will retry");
                EntryState::SetupRetry { attempt }
            }
            Err(err) => {
                error!(entry_id, error = %err, "entry setup failed");
                EntryState::SetupError {
                    reason: err.to_string(),
                }
            }
        };
        slot.set(state.clone());
        drop(slots);
        if let Some(runtime) = extra {
            runtime.teardown().await;
        }
        state
    }

    /// Record a loaded entry's devices on its config entry.
    fn register_devices(&self, runtime: &EntryRuntime) {
        let devices = runtime
            .store()
            .devices_snapshot()
            .iter()
            .map(|device| device.as_ref().clone())
            .collect();
        if let Err(err) = self
            .inner
            .entries
            .update(runtime.entry_id(), |entry| entry.devices = devices)
        {
            debug!(entry_id = runtime.entry_id(), error = %err, "entry removed before devices were registered");
        }
    }
}

/// Retry setup with backoff until it stops failing to connect, the retry
/// budget runs out, or the entry is unloaded.
async fn retry_loop(hub: Hub, entry_id: String, cancel: CancellationToken) {
    let mut failures: u32 = 1;

    loop {
        let pacing = hub.config().setup_retry.clone();
        if pacing.max_retries.is_some_and(|max| failures > max) {
            let mut slots = hub.inner.slots.lock().await;
            if let Some(slot) = slots.get_mut(&entry_id) {
                error!(entry_id, failures, "giving up on entry setup");
                slot.set(EntryState::SetupError {
                    reason: format!("controller unreachable after {failures} attempts"),
                });
            }
            break;
        }

        let delay = calculate_backoff(failures - 1, &pacing);
        debug!(entry_id, ?delay, failures, "waiting before setup retry");
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }

        match hub.attempt(&entry_id, failures, &cancel).await {
            EntryState::SetupRetry { attempt } => failures = attempt,
            _ => break,
        }
    }

    if let Some(slot) = hub.inner.slots.lock().await.get_mut(&entry_id) {
        if !cancel.is_cancelled() {
            slot.retry = None;
        }
    }
}
