// Module declarations
mod builder;
mod connection;
mod core;
mod driver;
mod state;

// Public API exports
pub use builder::{IncusClientBuilder, IncusClientOptions};
pub use connection::{Action, ConnectionManager, ConnectionState};
pub use self::core::IncusClient;
pub use state::ClientState;
