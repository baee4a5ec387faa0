use super::driver::Driver;
use super::{ClientState, ConnectionManager, IncusClient};
use crate::infrastructure::{poll_endpoint, socket_endpoint};
use crate::transport::{
    LinkReceiver, LinkSender, LongPollTransport, PollTransport, SocketTransport,
    WebSocketTransport,
};
use crate::types::{DEFAULT_POLL_TIMEOUT, IncusError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

#[derive(Debug, Clone, Default)]
pub struct IncusClientOptions {
    /// Retry cap per transport (default 6)
    pub max_retries: Option<u32>,
    /// Fixed reconnect delay in milliseconds (default 1000)
    pub retry_interval: Option<u64>,
    /// Per-request long-poll timeout in milliseconds (default 90 000)
    pub poll_timeout: Option<u64>,
    /// Never open the socket; every command rides on long-poll requests
    pub disable_socket: bool,
    /// Page subscribed from the first request on
    pub page: Option<String>,
}

/// Builder for IncusClient that validates settings and wires transports
pub struct IncusClientBuilder {
    user: String,
    socket_endpoint: Url,
    poll_endpoint: Url,
    options: IncusClientOptions,
}

impl IncusClientBuilder {
    /// Create a new builder for `user` on the bus at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`IncusError::Auth`] for an empty user and
    /// [`IncusError::InvalidAddress`] or [`IncusError::UrlParse`] for an
    /// address that cannot be mapped onto the bus endpoints.
    pub fn new(
        address: impl AsRef<str>,
        user: impl Into<String>,
        options: IncusClientOptions,
    ) -> Result<Self> {
        let user = user.into();
        if user.trim().is_empty() {
            return Err(IncusError::Auth("user identity is required".to_string()));
        }

        let address = address.as_ref();
        Ok(Self {
            user,
            socket_endpoint: socket_endpoint(address)?,
            poll_endpoint: poll_endpoint(address)?,
            options,
        })
    }

    pub fn socket_endpoint(&self) -> &Url {
        &self.socket_endpoint
    }

    pub fn poll_endpoint(&self) -> &Url {
        &self.poll_endpoint
    }

    /// Build the client and spawn its driver task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<IncusClient> {
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        let timeout = Duration::from_millis(self.options.poll_timeout.unwrap_or(DEFAULT_POLL_TIMEOUT));
        let poll = LongPollTransport::new(self.poll_endpoint.clone(), timeout, link_tx.clone())?;

        let socket: Option<Box<dyn SocketTransport>> = if self.options.disable_socket {
            tracing::info!("Socket disabled, using long-poll only");
            None
        } else {
            Some(Box::new(WebSocketTransport::new(
                self.socket_endpoint.clone(),
                link_tx.clone(),
            )))
        };

        Ok(self.launch((link_tx, link_rx), socket, Box::new(poll)))
    }

    /// Spawns the driver over the given transports
    pub(crate) fn launch(
        self,
        link: (LinkSender, LinkReceiver),
        socket: Option<Box<dyn SocketTransport>>,
        poll: Box<dyn PollTransport>,
    ) -> IncusClient {
        let shared = Arc::new(ClientState::new());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let manager = ConnectionManager::new(self.user.clone(), &self.options, socket.is_some());
        let driver = Driver::new(manager, socket, poll, link, command_rx, Arc::clone(&shared));
        *shared.driver.lock() = Some(tokio::spawn(driver.run()));

        IncusClient {
            user: self.user,
            commands: command_tx,
            shared,
        }
    }
}
