// Messaging module - Event names and handler dispatch
pub mod event;
pub mod registry;

pub use event::{BusEvent, CommandKind};
pub use registry::{EventHandler, EventRegistry};
