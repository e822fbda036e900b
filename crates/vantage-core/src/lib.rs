// vantage-core: Home Assistant style bridge over a Vantage controller link.

pub mod actions;
pub mod bridge;
pub mod config;
pub mod discovery;
pub mod entry;
pub mod error;
pub mod events;
pub mod flow;
pub mod hub;
pub mod migrate;
pub mod model;
pub mod runtime;
pub mod services;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use actions::{EntityAction, commands_for};
pub use bridge::BridgeStats;
pub use config::{BridgeConfig, TaskNamePolicy};
pub use discovery::{DiscoveredController, serial_from_hostname};
pub use entry::{ConfigEntries, ConfigEntry, ENTRY_TITLE, EntryData};
pub use error::{CoreError, ErrorKind};
pub use events::{EventBus, translate};
pub use flow::{
    AbortReason, AuthInput, ConfigFlow, FlowResult, FlowStep, FormError, ReauthFlow,
    ReconfigureFlow, ReconfigureInput,
};
pub use hub::{EntryState, Hub};
pub use runtime::EntryRuntime;
pub use services::{TaskCall, TaskService, TaskTarget};
pub use store::{EntityStore, EntityStream, Snapshot};

// Model types at the crate root for ergonomics.
pub use model::{
    // Entities
    Entity, EntityKind, EntityState, Platform,
    // Devices
    DeviceInfo,
    // Bus events
    BusEvent, BusEventData, BusEventType, ButtonEventData, TaskEventData,
    // Services
    TaskSelector,
    // Directory access
    Directory,
};
