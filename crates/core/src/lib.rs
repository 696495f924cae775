pub mod commands;
pub mod log;
pub mod payloads;
pub mod render;
pub mod state;
pub mod topics;

pub use commands::{TimeField, UiCommand};
pub use log::ActivityLog;
pub use payloads::{DecodeError, RelayStates, Schedule, ScheduleEntry};
pub use render::{render, PanelView, RelayCard};
pub use state::{Effect, PanelController, PanelEvent, PanelState, PublishKind, PublishRequest};
pub use topics::*;
