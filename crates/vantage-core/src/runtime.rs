// ── Entry runtime ──
//
// Everything one loaded config entry owns: the controller link, the
// entity store, and the bridge, emitter and sweep tasks. Setup builds it,
// teardown stops it; nothing outlives the entry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vantage_link::{
    Connector, ControllerInfo, Error as LinkError, LinkHandle, LinkState, ObjectCommand, Vid,
};

use crate::actions::{EntityAction, commands_for};
use crate::bridge::{BridgeStats, bridge_task, sweep_task};
use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::events::{EmitterDirectory, EventBus, emitter_task};
use crate::model::{Directory, TaskSelector, resolve_task};
use crate::services::{TaskService, TaskTarget};
use crate::store::EntityStore;

/// One loaded config entry. Cheaply cloneable.
#[derive(Clone)]
pub struct EntryRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    entry_id: String,
    info: ControllerInfo,
    config: BridgeConfig,
    store: Arc<EntityStore>,
    stats: Arc<BridgeStats>,
    link: LinkHandle,
    reauth: AtomicBool,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl EntryRuntime {
    /// Connect, load the object directory, and start the entry's tasks.
    ///
    /// Connection and login failures are returned as-is; the caller decides
    /// whether to retry.
    pub async fn setup(
        entry_id: impl Into<String>,
        connector: Arc<dyn Connector>,
        config: BridgeConfig,
        bus: EventBus,
        cancel: CancellationToken,
    ) -> Result<Self, CoreError> {
        let entry_id = entry_id.into();
        let endpoint = connector.endpoint();
        let established = LinkHandle::connect(connector, config.link_config(), cancel.child_token())
            .await
            .map_err(CoreError::from)?;

        let store = Arc::new(EntityStore::new());
        store.load(established.objects);
        let stats = Arc::new(BridgeStats::default());
        let link = established.handle;

        // Subscribe before the link starts so no event slips past.
        let bridge_rx = link.subscribe();
        let emitter_rx = link.subscribe();

        let handles = vec![
            tokio::spawn(bridge_task(
                entry_id.clone(),
                bridge_rx,
                Arc::clone(&store),
                Arc::clone(&stats),
                config.stale_grace,
                cancel.clone(),
            )),
            tokio::spawn(emitter_task(
                entry_id.clone(),
                emitter_rx,
                EmitterDirectory::new(store.objects()),
                bus,
                cancel.clone(),
            )),
            tokio::spawn(sweep_task(
                entry_id.clone(),
                Arc::clone(&store),
                config.stale_grace,
                config.sweep_interval,
                cancel.clone(),
            )),
        ];
        link.start();

        info!(
            entry_id,
            endpoint,
            serial = %established.info.serial_number,
            entities = store.entity_count(),
            devices = store.device_count(),
            "entry loaded"
        );

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                entry_id,
                info: established.info,
                config,
                store,
                stats,
                link,
                reauth: AtomicBool::new(false),
                cancel,
                task_handles: Mutex::new(handles),
            }),
        })
    }

    /// Stop every task and close the link.
    pub async fn teardown(&self) {
        self.inner.cancel.cancel();
        self.inner.link.shutdown().await;

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!(entry_id = %self.inner.entry_id, "entry torn down");
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn entry_id(&self) -> &str {
        &self.inner.entry_id
    }

    pub fn info(&self) -> &ControllerInfo {
        &self.inner.info
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.inner.store
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.inner.stats
    }

    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.inner.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.link.is_connected()
    }

    /// The controller rejected this entry's credentials.
    pub fn needs_reauth(&self) -> bool {
        self.inner.reauth.load(Ordering::SeqCst)
            || *self.inner.link.state().borrow() == LinkState::AuthFailed
    }

    // ── Entity actions ───────────────────────────────────────────────

    /// Carry out `action` on the entity for `vid`.
    pub async fn execute(&self, vid: Vid, action: &EntityAction) -> Result<(), CoreError> {
        let store = &self.inner.store;
        let entity = store.entity(vid).ok_or_else(|| CoreError::EntityNotFound {
            identifier: vid.to_string(),
        })?;
        let object = store.lookup(vid).ok_or_else(|| CoreError::EntityNotFound {
            identifier: entity.entity_id(),
        })?;
        let commands = commands_for(&entity, &object, action)?;
        let target = format!("{} ({vid})", entity.entity_id());
        debug!(entry_id = %self.inner.entry_id, %target, action = action.name(), "executing");

        for command in commands {
            self.send(&target, command).await?;
        }
        Ok(())
    }

    // ── Task services ────────────────────────────────────────────────

    /// Resolve `selector` against this controller's tasks and run `service`.
    pub async fn call_task(
        &self,
        service: TaskService,
        selector: &TaskSelector,
    ) -> Result<TaskTarget, CoreError> {
        let tasks = self.inner.store.tasks();
        let task = resolve_task(&tasks, selector, self.inner.config.task_name_policy)?;
        self.run_task(service, task.vid).await
    }

    /// Run `service` on the task with `vid`, already resolved.
    pub(crate) async fn run_task(&self, service: TaskService, vid: Vid) -> Result<TaskTarget, CoreError> {
        let task = self
            .inner
            .store
            .lookup(vid)
            .ok_or_else(|| CoreError::TaskNotFound {
                selector: format!("id {vid}"),
            })?;
        let target = TaskTarget {
            entry_id: self.inner.entry_id.clone(),
            task_id: vid,
            task_name: task.name,
        };
        let label = format!("{} ({vid})", target.task_name);
        self.send(&label, service.command(vid)).await?;
        info!(entry_id = %self.inner.entry_id, task = %label, %service, "task service called");
        Ok(target)
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn send(&self, target: &str, command: ObjectCommand) -> Result<(), CoreError> {
        if !self.inner.link.is_connected() {
            return Err(CoreError::ControllerDisconnected);
        }
        let vid = command.vid();
        match self.inner.link.send(command).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.is_auth_failure() && !self.inner.reauth.swap(true, Ordering::SeqCst) {
                    warn!(entry_id = %self.inner.entry_id, "credentials rejected; re-authentication required");
                }
                if matches!(err, LinkError::InvalidObject { .. })
                    && self.inner.store.mark_entity_unavailable(vid)
                {
                    self.inner.stats.record_transition();
                    warn!(entry_id = %self.inner.entry_id, %target, "controller no longer knows this object");
                }
                Err(CoreError::command(target, err))
            }
        }
    }
}
