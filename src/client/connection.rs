use super::IncusClientOptions;
use crate::infrastructure::{PollQuery, RetryPolicy};
use crate::transport::{Epoch, LinkEvent, PollOutcome, TransportKind};
use crate::types::{
    Command, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL, Envelope, Inbound, decode,
};
use std::collections::VecDeque;
use std::time::Duration;

/// Logical connection state, as seen by outbound routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing established and no transport running; a socket retry may be pending
    Disconnected,
    /// Long-poll loop is the route; no socket attempt in flight
    PollingOnly,
    /// Socket attempt in flight; long-poll (if running) is still the route
    SocketConnecting,
    /// Socket open, `authenticate` being queued. Transient within one event.
    Authenticating,
    /// Socket authenticated and carrying all traffic
    SocketPrimary,
    /// Socket was primary and has closed. Sends still target it (and are lost)
    /// until it reauthenticates or its retries run out.
    SocketStale,
    /// No recovery path left, or shut down explicitly
    Closed,
}

impl ConnectionState {
    /// Whether outbound traffic is routed to the socket
    pub fn socket_is_primary(&self) -> bool {
        matches!(
            self,
            Self::Authenticating | Self::SocketPrimary | Self::SocketStale
        )
    }
}

/// Side effects requested by the [`ConnectionManager`]
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    OpenSocket { epoch: Epoch },
    SendSocket(String),
    CloseSocket,
    StartPoll { epoch: Epoch, query: PollQuery },
    AbortPoll,
    ScheduleRetry {
        transport: TransportKind,
        epoch: Epoch,
        delay: Duration,
    },
    Dispatch(Envelope),
    FireConnect,
}

/// Failover and authentication state machine.
///
/// Owns the retry counters, the epochs of both transports and the routing
/// decision. It performs no I/O: every input returns the [`Action`]s the
/// driver must carry out, in order. Inputs tagged with an epoch that is no
/// longer current are ignored, which makes late completions and expired
/// timers harmless.
pub struct ConnectionManager {
    user: String,
    page: Option<String>,
    groups: Option<Vec<String>>,
    state: ConnectionState,
    socket_available: bool,

    socket_retry: RetryPolicy,
    poll_retry: RetryPolicy,

    socket_epoch: Epoch,
    /// Socket attempt currently connecting or open
    socket_live: Option<Epoch>,
    socket_retry_armed: Option<Epoch>,

    poll_epoch: Epoch,
    poll_in_flight: Option<Epoch>,
    poll_retry_armed: Option<Epoch>,
    /// The in-flight request delivers a queued command
    poll_carries_command: bool,
    polling: bool,
    /// Last completed poll succeeded
    poll_healthy: bool,

    /// Commands waiting for a poll request to carry them
    outbox: VecDeque<Command>,
    connect_fired: bool,
}

impl ConnectionManager {
    pub fn new(user: impl Into<String>, options: &IncusClientOptions, socket_available: bool) -> Self {
        let max_retries = options.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        let delay = Duration::from_millis(options.retry_interval.unwrap_or(DEFAULT_RETRY_INTERVAL));

        Self {
            user: user.into(),
            page: options.page.clone().filter(|page| !page.is_empty()),
            groups: None,
            state: ConnectionState::Disconnected,
            socket_available,
            socket_retry: RetryPolicy::new(TransportKind::Socket, max_retries, delay),
            poll_retry: RetryPolicy::new(TransportKind::Poll, max_retries, delay),
            socket_epoch: 0,
            socket_live: None,
            socket_retry_armed: None,
            poll_epoch: 0,
            poll_in_flight: None,
            poll_retry_armed: None,
            poll_carries_command: false,
            polling: false,
            poll_healthy: false,
            outbox: VecDeque::new(),
            connect_fired: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether logical connectivity is currently up
    pub fn is_connected(&self) -> bool {
        match self.state {
            ConnectionState::SocketPrimary => true,
            ConnectionState::PollingOnly | ConnectionState::SocketConnecting => {
                self.polling && self.poll_healthy
            }
            _ => false,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn page(&self) -> Option<&str> {
        self.page.as_deref()
    }

    /// Commands waiting for a poll request
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    pub fn retry_attempts(&self, transport: TransportKind) -> u32 {
        match transport {
            TransportKind::Socket => self.socket_retry.attempts(),
            TransportKind::Poll => self.poll_retry.attempts(),
        }
    }

    /// Starts the long-poll loop and, if available, a socket attempt in parallel.
    pub fn start(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state != ConnectionState::Disconnected || self.polling {
            return actions;
        }

        tracing::info!("Starting long-poll loop for {}", self.user);
        self.polling = true;
        self.set_state(ConnectionState::PollingOnly);
        self.start_poll(&mut actions);

        if self.socket_available {
            self.open_socket(&mut actions);
        }

        actions
    }

    /// Handles one transport notification or timer expiry.
    pub fn handle(&mut self, event: LinkEvent) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state == ConnectionState::Closed {
            tracing::debug!("Ignoring {:?} on closed connection", event);
            return actions;
        }

        match event {
            LinkEvent::SocketOpened { epoch } => self.on_socket_opened(epoch, &mut actions),
            LinkEvent::SocketMessage { epoch, text } => {
                self.on_socket_message(epoch, &text, &mut actions)
            }
            LinkEvent::SocketClosed { epoch } => self.on_socket_closed(epoch, &mut actions),
            LinkEvent::PollCompleted { epoch, outcome } => {
                self.on_poll_completed(epoch, outcome, &mut actions)
            }
            LinkEvent::RetryDue {
                transport: TransportKind::Socket,
                epoch,
            } => self.on_socket_retry_due(epoch, &mut actions),
            LinkEvent::RetryDue {
                transport: TransportKind::Poll,
                epoch,
            } => self.on_poll_retry_due(epoch, &mut actions),
        }

        actions
    }

    /// Routes an application command through the current primary transport.
    ///
    /// Page and group subscriptions are remembered and re-asserted after
    /// every socket authentication.
    pub fn send(&mut self, command: Command) -> Vec<Action> {
        let mut actions = Vec::new();

        match &command {
            Command::SetPage { page } => self.page = Some(page.clone()),
            Command::SetGroups { groups } => self.groups = Some(groups.clone()),
            _ => {}
        }

        match self.state {
            ConnectionState::Closed => {
                tracing::debug!("Dropping {} command on closed connection", command.kind());
            }
            ConnectionState::SocketStale if self.socket_live.is_some() => {
                // The bus expects `authenticate` as the first frame of a connection
                tracing::debug!(
                    "Dropping {} command while the socket reconnects",
                    command.kind()
                );
            }
            state if state.socket_is_primary() => {
                tracing::debug!("Routing {} command via socket", command.kind());
                self.push_socket(command, &mut actions);
            }
            _ => {
                tracing::debug!("Routing {} command via long-poll", command.kind());
                self.outbox.push_back(command);
                // An idle request is restarted to carry the command. A request
                // already carrying one is left alone; the rest wait their turn.
                if self.polling && self.poll_in_flight.is_some() && !self.poll_carries_command {
                    self.start_poll(&mut actions);
                }
            }
        }

        actions
    }

    /// Stops both transports for good.
    pub fn shutdown(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state == ConnectionState::Closed && !self.polling && self.socket_live.is_none() {
            return actions;
        }

        tracing::info!("Shutting down connection for {}", self.user);
        self.polling = false;
        self.poll_in_flight = None;
        self.poll_retry_armed = None;
        self.socket_live = None;
        self.socket_retry_armed = None;
        self.outbox.clear();

        actions.push(Action::AbortPoll);
        actions.push(Action::CloseSocket);
        self.set_state(ConnectionState::Closed);

        actions
    }

    fn on_socket_opened(&mut self, epoch: Epoch, actions: &mut Vec<Action>) {
        if self.socket_live != Some(epoch) {
            tracing::debug!("Ignoring open of stale socket (epoch {})", epoch);
            return;
        }

        tracing::info!("Socket opened, authenticating as {}", self.user);
        self.set_state(ConnectionState::Authenticating);
        self.push_socket(
            Command::Authenticate {
                user: self.user.clone(),
            },
            actions,
        );
        self.socket_retry.reset();
        self.set_state(ConnectionState::SocketPrimary);
        self.stop_polling(actions);

        if let Some(page) = self.page.clone() {
            self.push_socket(Command::SetPage { page }, actions);
        }
        if let Some(groups) = self.groups.clone() {
            self.push_socket(Command::SetGroups { groups }, actions);
        }
        // Subscriptions were just re-asserted from their latest values
        let queued: Vec<Command> = self.outbox.drain(..).collect();
        for command in queued {
            if !matches!(command, Command::SetPage { .. } | Command::SetGroups { .. }) {
                self.push_socket(command, actions);
            }
        }

        self.fire_connect_once(actions);
    }

    fn on_socket_message(&mut self, epoch: Epoch, text: &str, actions: &mut Vec<Action>) {
        if self.socket_live != Some(epoch) {
            tracing::debug!("Ignoring message from stale socket (epoch {})", epoch);
            return;
        }

        match decode(text) {
            Ok(Inbound::KeepAlive) => {
                tracing::debug!("Socket keep-alive");
                self.socket_retry.reset();
            }
            Ok(Inbound::Event(envelope)) => actions.push(Action::Dispatch(envelope)),
            Err(e) => tracing::warn!("Dropping inbound socket message: {}", e),
        }
    }

    fn on_socket_closed(&mut self, epoch: Epoch, actions: &mut Vec<Action>) {
        if self.socket_live != Some(epoch) {
            tracing::debug!("Ignoring closure of stale socket (epoch {})", epoch);
            return;
        }

        self.socket_live = None;
        let was_primary = self.state.socket_is_primary();
        tracing::info!("Socket closed (epoch {})", epoch);

        match self.socket_retry.next_delay() {
            Ok(delay) => {
                tracing::info!(
                    "Reconnecting socket in {:?} (attempt {})",
                    delay,
                    self.socket_retry.attempts()
                );
                self.socket_retry_armed = Some(epoch);
                actions.push(Action::ScheduleRetry {
                    transport: TransportKind::Socket,
                    epoch,
                    delay,
                });

                if was_primary {
                    self.set_state(ConnectionState::SocketStale);
                } else {
                    self.settle();
                }
            }
            Err(e) => {
                tracing::warn!("{}", e);
                if was_primary {
                    tracing::info!("Degrading to long-poll");
                    self.set_state(ConnectionState::Disconnected);
                    self.resume_polling(actions);
                }
                self.settle();
            }
        }
    }

    fn on_socket_retry_due(&mut self, epoch: Epoch, actions: &mut Vec<Action>) {
        if self.socket_retry_armed != Some(epoch) || self.state == ConnectionState::SocketPrimary {
            tracing::debug!("Ignoring expired socket retry timer (epoch {})", epoch);
            return;
        }

        self.socket_retry_armed = None;
        self.open_socket(actions);
    }

    fn on_poll_completed(&mut self, epoch: Epoch, outcome: PollOutcome, actions: &mut Vec<Action>) {
        if self.poll_in_flight != Some(epoch) || !self.polling {
            tracing::debug!("Ignoring completion of stale long-poll (epoch {})", epoch);
            return;
        }
        self.poll_in_flight = None;

        match outcome {
            PollOutcome::Response { status, body } if (200..300).contains(&status) => {
                self.poll_healthy = true;
                match decode(&body) {
                    Ok(Inbound::KeepAlive) => {
                        tracing::debug!("Long-poll keep-alive (status {})", status);
                        self.poll_retry.reset();
                    }
                    Ok(Inbound::Event(envelope)) => actions.push(Action::Dispatch(envelope)),
                    Err(e) => tracing::warn!("Dropping inbound long-poll body: {}", e),
                }

                self.fire_connect_once(actions);
                self.start_poll(actions);
            }
            failure => {
                self.poll_healthy = false;
                match failure {
                    PollOutcome::Response { status, .. } => {
                        tracing::warn!("Long-poll returned status {}", status)
                    }
                    PollOutcome::Failed(reason) => tracing::warn!("Long-poll failed: {}", reason),
                }

                // Re-armed after the fixed delay rather than immediately, so a
                // failing bus is not hammered with back-to-back requests
                match self.poll_retry.next_delay() {
                    Ok(delay) => {
                        self.poll_retry_armed = Some(epoch);
                        actions.push(Action::ScheduleRetry {
                            transport: TransportKind::Poll,
                            epoch,
                            delay,
                        });
                    }
                    Err(e) => {
                        tracing::warn!("{}", e);
                        self.polling = false;
                        if !self.state.socket_is_primary() {
                            self.settle();
                        }
                    }
                }
            }
        }
    }

    fn on_poll_retry_due(&mut self, epoch: Epoch, actions: &mut Vec<Action>) {
        if self.poll_retry_armed != Some(epoch) || !self.polling {
            tracing::debug!("Ignoring expired long-poll retry timer (epoch {})", epoch);
            return;
        }

        self.poll_retry_armed = None;
        self.start_poll(actions);
    }

    fn open_socket(&mut self, actions: &mut Vec<Action>) {
        self.socket_epoch += 1;
        self.socket_live = Some(self.socket_epoch);
        actions.push(Action::OpenSocket {
            epoch: self.socket_epoch,
        });

        if !self.state.socket_is_primary() {
            self.set_state(ConnectionState::SocketConnecting);
        }
    }

    fn start_poll(&mut self, actions: &mut Vec<Action>) {
        self.poll_epoch += 1;
        self.poll_in_flight = Some(self.poll_epoch);

        let command = self.next_queued_wire();
        self.poll_carries_command = command.is_some();
        actions.push(Action::StartPoll {
            epoch: self.poll_epoch,
            query: PollQuery {
                user: self.user.clone(),
                page: self.page.clone(),
                command,
            },
        });
    }

    fn next_queued_wire(&mut self) -> Option<String> {
        while let Some(command) = self.outbox.pop_front() {
            match command.encode() {
                Ok(wire) => return Some(wire),
                Err(e) => tracing::error!("Failed to encode {} command: {}", command.kind(), e),
            }
        }
        None
    }

    fn stop_polling(&mut self, actions: &mut Vec<Action>) {
        if !self.polling {
            return;
        }

        tracing::info!("Socket is primary, stopping long-poll loop");
        self.polling = false;
        self.poll_retry_armed = None;
        if self.poll_in_flight.take().is_some() {
            actions.push(Action::AbortPoll);
        }
    }

    fn resume_polling(&mut self, actions: &mut Vec<Action>) {
        if self.polling || self.poll_retry.is_exhausted() {
            return;
        }

        tracing::info!("Resuming long-poll loop for {}", self.user);
        self.polling = true;
        self.poll_healthy = false;
        self.start_poll(actions);
    }

    /// Picks the state once the socket is no longer the route
    fn settle(&mut self) {
        let next = if self.socket_live.is_some() {
            ConnectionState::SocketConnecting
        } else if self.polling {
            ConnectionState::PollingOnly
        } else if self.socket_retry_armed.is_some() {
            ConnectionState::Disconnected
        } else {
            if !self.outbox.is_empty() {
                tracing::debug!("Discarding {} queued commands", self.outbox.len());
                self.outbox.clear();
            }
            ConnectionState::Closed
        };
        self.set_state(next);
    }

    fn push_socket(&self, command: Command, actions: &mut Vec<Action>) {
        match command.encode() {
            Ok(wire) => actions.push(Action::SendSocket(wire)),
            Err(e) => tracing::error!("Failed to encode {} command: {}", command.kind(), e),
        }
    }

    fn fire_connect_once(&mut self, actions: &mut Vec<Action>) {
        if self.connect_fired {
            return;
        }

        tracing::info!("Connected to bus as {}", self.user);
        self.connect_fired = true;
        actions.push(Action::FireConnect);
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::debug!("Connection state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
