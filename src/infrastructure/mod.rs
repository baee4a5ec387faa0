// Infrastructure module - Core background services and utilities
pub mod http;
pub mod retry;
pub mod task_manager;

pub use http::{PollQuery, poll_endpoint, socket_endpoint};
pub use retry::RetryPolicy;
pub use task_manager::TaskManager;
