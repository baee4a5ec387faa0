//! Transports carrying frames between the client and the bus.
//!
//! Transports never make decisions. They perform I/O when told to and report
//! every lifecycle step as a [`LinkEvent`] on the shared link queue, tagged
//! with the [`Epoch`] of the attempt that produced it. The connection manager
//! drops events whose epoch is no longer current.

pub mod longpoll;
pub mod socket;

use crate::infrastructure::PollQuery;
use crate::types::Result;
use std::time::Duration;
use tokio::sync::mpsc;

pub use longpoll::LongPollTransport;
pub use socket::WebSocketTransport;

/// Generation counter identifying one socket connection or one poll request
pub type Epoch = u64;

/// Sending half of the link queue
pub type LinkSender = mpsc::UnboundedSender<LinkEvent>;

/// Receiving half of the link queue
pub type LinkReceiver = mpsc::UnboundedReceiver<LinkEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Socket,
    Poll,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Poll => "poll",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a long-poll request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The server answered with a status and a (possibly empty) body
    Response { status: u16, body: String },
    /// No response was obtained (connect error, timeout, broken body)
    Failed(String),
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Response { status, .. } if (200..300).contains(status))
    }
}

/// Notifications posted to the connection manager's queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    SocketOpened { epoch: Epoch },
    SocketMessage { epoch: Epoch, text: String },
    SocketClosed { epoch: Epoch },
    PollCompleted { epoch: Epoch, outcome: PollOutcome },
    /// A retry timer armed for `epoch` has expired
    RetryDue { transport: TransportKind, epoch: Epoch },
}

/// Persistent bidirectional channel (`/socket`)
pub trait SocketTransport: Send {
    /// Starts connecting; reports `SocketOpened` or `SocketClosed` for `epoch`.
    /// Any previous connection is dropped first.
    fn open(&mut self, epoch: Epoch);

    /// Writes one frame to the open channel.
    ///
    /// # Errors
    ///
    /// Returns [`IncusError::ChannelClosed`](crate::IncusError::ChannelClosed)
    /// if no channel is open.
    fn send(&mut self, wire: String) -> Result<()>;

    /// Drops the channel without reporting a closure
    fn close(&mut self);
}

/// One-request-at-a-time polling channel (`/lp`)
pub trait PollTransport: Send {
    /// Issues a request, aborting any request still in flight.
    /// Reports `PollCompleted` for `epoch` unless aborted.
    fn request(&mut self, epoch: Epoch, query: PollQuery);

    /// Aborts the in-flight request, if any, without reporting it
    fn abort(&mut self);
}

/// Posts a `RetryDue` event after `delay`
pub(crate) async fn retry_timer(
    events: LinkSender,
    transport: TransportKind,
    epoch: Epoch,
    delay: Duration,
) {
    tokio::time::sleep(delay).await;
    tracing::debug!("Retry timer for {} (epoch {}) expired", transport, epoch);
    let _ = events.send(LinkEvent::RetryDue { transport, epoch });
}
