// vantage-link: controller link seam for Vantage InFusion controllers
//
// Object model, push events, outbound commands, and a supervised link loop
// that reconnects on transport loss. The wire protocol sits behind the
// `Connector` / `Session` traits; `memory` provides simulated controllers.

pub mod auth;
pub mod command;
pub mod error;
pub mod event;
pub mod link;
pub mod memory;
pub mod object;
pub mod state;
pub mod transport;

pub use auth::{ConnectParams, Credentials, DEFAULT_USERNAME};
pub use command::ObjectCommand;
pub use error::Error;
pub use event::LinkEvent;
pub use link::{Established, LinkConfig, LinkHandle, LinkState, ReconnectConfig};
pub use memory::{ControllerFixture, MemoryController, MemoryNetwork};
pub use object::{
    ColorType, GMemTag, ObjectProfile, ObjectType, OmniMeasure, ParentRef, SystemObject, Vid,
};
pub use state::{FanMode, HvacStatus, ObjectState, OperationMode, Value};
pub use transport::{
    Connector, ControllerDetails, ControllerInfo, ControllerProbe, LinkFactory, Session,
};
