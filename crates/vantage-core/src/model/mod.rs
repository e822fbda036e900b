// ── Domain model ──
//
// Pure types and rules: how controller objects classify into entities,
// how their state renders, which devices they form, and what the bus and
// task services carry. Nothing in here does I/O.

pub mod classify;
pub mod device;
pub mod entity;
pub mod event;
pub mod project;
pub mod task;

use vantage_link::{ObjectType, SystemObject, Vid};

pub use classify::{
    BinarySource, CoverClass, EntityKind, LightVariant, NumberRange, Platform, SensorKind, classify,
};
pub use device::{DeviceInfo, device_info, is_parent_device, variables_device, variables_device_id};
pub use entity::Entity;
pub use event::{BusEvent, BusEventData, BusEventType, ButtonEventData, TaskEventData};
pub use project::{
    ClimateFanMode, ClimateState, CoverState, EntityState, HvacAction, HvacMode, LightState, project,
};
pub use task::{TaskSelector, resolve_task};

/// Read access to a controller's object directory.
pub trait Directory {
    fn lookup(&self, vid: Vid) -> Option<SystemObject>;

    /// Objects whose parent is `parent`, in directory order.
    fn children_of(&self, parent: Vid) -> Vec<SystemObject>;

    /// The controller's Master object, if the directory has one.
    fn master(&self) -> Option<Vid>;

    fn tasks(&self) -> Vec<SystemObject>;
}

impl Directory for Vec<SystemObject> {
    fn lookup(&self, vid: Vid) -> Option<SystemObject> {
        self.iter().find(|o| o.vid == vid).cloned()
    }

    fn children_of(&self, parent: Vid) -> Vec<SystemObject> {
        self.iter()
            .filter(|o| o.parent.is_some_and(|p| p.vid == parent))
            .cloned()
            .collect()
    }

    fn master(&self) -> Option<Vid> {
        self.iter()
            .filter(|o| o.object_type == ObjectType::Master)
            .map(|o| o.vid)
            .min()
    }

    fn tasks(&self) -> Vec<SystemObject> {
        self.iter()
            .filter(|o| o.object_type == ObjectType::Task)
            .cloned()
            .collect()
    }
}
