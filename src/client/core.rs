use super::driver::ClientCommand;
use super::{ClientState, ConnectionState, IncusClientBuilder, IncusClientOptions};
use crate::messaging::BusEvent;
use crate::types::{Command, Result, Target};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Handle to a bus connection for one subscriber.
///
/// Construction starts connecting immediately: the long-poll loop starts at
/// once and a socket is attempted in parallel. The socket takes over after it
/// authenticates; the client falls back to long-polling when the socket gives
/// up. All messaging calls are fire-and-forget.
///
/// Clones share the same connection. Dropping every clone stops it.
///
/// # Example
///
/// ```no_run
/// use incus_client::IncusClient;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = IncusClient::connect("https://bus.example.com", "u1")?;
///
/// client.on("connect", |_| println!("connected"));
/// client.on("chat", |data| println!("chat: {data}"));
///
/// client.set_page("lobby");
/// client.message_page("chat", "lobby", json!({"text": "hello"}));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct IncusClient {
    pub(crate) user: String,
    pub(crate) commands: mpsc::UnboundedSender<ClientCommand>,
    pub(crate) shared: Arc<ClientState>,
}

impl IncusClient {
    /// Connects `user` to the bus at `address` with default options.
    ///
    /// # Errors
    ///
    /// Fails if the user is empty or the address cannot be mapped onto the
    /// bus endpoints. Transport failures are never reported here; they are
    /// retried in the background.
    pub fn connect(address: impl AsRef<str>, user: impl Into<String>) -> Result<Self> {
        Self::new(address, user, IncusClientOptions::default())
    }

    /// Connects with explicit options. See [`IncusClientOptions`].
    pub fn new(
        address: impl AsRef<str>,
        user: impl Into<String>,
        options: IncusClientOptions,
    ) -> Result<Self> {
        IncusClientBuilder::new(address, user, options)?.build()
    }

    /// Registers the handler for `event`, replacing any previous one.
    ///
    /// The reserved `connect` event fires once, on first connectivity. A
    /// `connect` handler registered while connected is invoked right away.
    pub fn on<F>(&self, event: impl Into<BusEvent>, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.shared.registry.on(event.into(), Arc::new(handler));
    }

    /// Receives the data of `event` through a channel.
    ///
    /// Takes the single handler slot of `event`, like [`on`](Self::on).
    pub fn listen(&self, event: impl Into<BusEvent>) -> mpsc::Receiver<Value> {
        self.shared.registry.listen(event.into())
    }

    pub fn message_user(&self, event: &str, user: &str, data: Value) {
        self.message(Target::User(user.to_string()), event, data);
    }

    pub fn message_users<I, S>(&self, event: &str, users: I, data: Value)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let users = users.into_iter().map(Into::into).collect();
        self.message(Target::Users(users), event, data);
    }

    pub fn message_page(&self, event: &str, page: &str, data: Value) {
        self.message(Target::Page(page.to_string()), event, data);
    }

    pub fn message_groups<I, S>(&self, event: &str, groups: I, data: Value)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let groups = groups.into_iter().map(Into::into).collect();
        self.message(Target::Groups(groups), event, data);
    }

    pub fn message_all(&self, event: &str, data: Value) {
        self.message(Target::All, event, data);
    }

    /// Subscribes to `page`; kept across reconnects.
    pub fn set_page(&self, page: &str) {
        self.submit(Command::SetPage {
            page: page.to_string(),
        });
    }

    /// Joins `groups`; kept across reconnects.
    pub fn set_groups<I, S>(&self, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(Command::SetGroups {
            groups: groups.into_iter().map(Into::into).collect(),
        });
    }

    /// Reports whether the user is actively looking at the page
    pub fn set_presence(&self, active: bool) {
        self.submit(Command::SetPresence { active });
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Watches connection state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.registry.is_connected()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Shuts the connection down for every clone of this handle.
    ///
    /// Aborts the in-flight poll, closes the socket and cancels pending
    /// retries. Later sends are dropped. Calling it again is a no-op.
    pub async fn close(&self) {
        if self.commands.send(ClientCommand::Shutdown).is_err() {
            tracing::debug!("Connection driver already stopped");
        }

        let driver = self.shared.driver.lock().take();
        if let Some(driver) = driver
            && let Err(e) = driver.await
        {
            tracing::warn!("Connection driver ended abnormally: {}", e);
        }
    }

    fn message(&self, target: Target, event: &str, data: Value) {
        self.submit(Command::Message {
            target,
            event: event.to_string(),
            data,
        });
    }

    fn submit(&self, command: Command) {
        if let Err(e) = self.commands.send(ClientCommand::Send(command)) {
            tracing::debug!("Connection driver stopped, dropping {:?}", e.0);
        }
    }
}
