//! # Incus Client
//!
//! An async Rust client for the Incus message bus.
//!
//! The client keeps one logical connection per subscriber. It long-polls
//! `<address>/lp` from the start and races a socket to `<address>/socket`
//! alongside; once the socket authenticates it carries all traffic, and the
//! client falls back to long-polling when the socket runs out of retries.
//!
//! ## Example
//!
//! ```no_run
//! use incus_client::IncusClient;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = IncusClient::connect("https://bus.example.com", "u1")?;
//!
//!     client.on("connect", |_| println!("connected"));
//!     client.on("chat", |data| println!("chat: {data}"));
//!
//!     client.set_page("lobby");
//!     client.message_all("chat", json!({"text": "hello"}));
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod infrastructure;
pub mod messaging;
pub mod transport;
pub mod types;

pub use client::{ConnectionState, IncusClient, IncusClientBuilder, IncusClientOptions};
pub use messaging::{BusEvent, CommandKind};
pub use transport::TransportKind;
pub use types::{Command, Envelope, IncusError, Result, Target};
