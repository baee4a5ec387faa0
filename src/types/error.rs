use crate::transport::TransportKind;
use thiserror::Error;

/// Errors that can occur when using the Incus client.
///
/// Most transport-level failures never reach the application: the connection
/// manager absorbs them into its retry and failover logic and only logs them.
#[derive(Error, Debug)]
pub enum IncusError {
    /// WebSocket protocol error (handshake failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP client error from the long-poll transport
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error (malformed bus address)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bus address uses a scheme that maps to neither HTTP nor WebSocket
    #[error("Invalid bus address: {0}")]
    InvalidAddress(String),

    /// Missing or unusable subscriber identity
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A transport could not be established
    #[error("{transport} transport failed to open: {reason}")]
    TransportOpen {
        transport: TransportKind,
        reason: String,
    },

    /// Non-empty inbound text that is not a valid envelope
    #[error("Protocol error: {reason}")]
    Protocol { reason: String },

    /// A transport hit its retry cap and stopped retrying
    #[error("{transport} transport gave up after {attempts} retries")]
    RetryExhausted {
        transport: TransportKind,
        attempts: u32,
    },

    /// Attempted to write to a channel that is not open
    #[error("Channel closed")]
    ChannelClosed,
}

/// Convenience type alias for `Result<T, IncusError>`.
pub type Result<T> = std::result::Result<T, IncusError>;
