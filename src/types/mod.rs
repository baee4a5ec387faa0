pub mod constants;
pub mod error;
pub mod message;

pub use constants::*;
pub use error::{IncusError, Result};
pub use message::{Command, CommandMessage, Envelope, Inbound, Target, decode};
