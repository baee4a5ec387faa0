use super::ClientState;
use super::connection::{Action, ConnectionManager};
use crate::infrastructure::TaskManager;
use crate::transport::{
    LinkReceiver, LinkSender, PollTransport, SocketTransport, retry_timer,
};
use crate::types::Command;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Requests from client handles to the driver
#[derive(Debug)]
pub(crate) enum ClientCommand {
    Send(Command),
    Shutdown,
}

/// Single task owning the connection manager and both transports.
///
/// Transport notifications, timer expiries and application commands are
/// processed one at a time, so the manager never sees concurrent input.
pub(crate) struct Driver {
    manager: ConnectionManager,
    socket: Option<Box<dyn SocketTransport>>,
    poll: Box<dyn PollTransport>,
    link_tx: LinkSender,
    link_rx: LinkReceiver,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    shared: Arc<ClientState>,
    timers: TaskManager,
}

impl Driver {
    pub(crate) fn new(
        manager: ConnectionManager,
        socket: Option<Box<dyn SocketTransport>>,
        poll: Box<dyn PollTransport>,
        (link_tx, link_rx): (LinkSender, LinkReceiver),
        commands: mpsc::UnboundedReceiver<ClientCommand>,
        shared: Arc<ClientState>,
    ) -> Self {
        Self {
            manager,
            socket,
            poll,
            link_tx,
            link_rx,
            commands,
            shared,
            timers: TaskManager::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::info!("Starting connection driver for {}", self.manager.user());
        let actions = self.manager.start();
        self.apply(actions);
        self.publish();

        loop {
            tokio::select! {
                Some(event) = self.link_rx.recv() => {
                    let actions = self.manager.handle(event);
                    self.apply(actions);
                }
                command = self.commands.recv() => match command {
                    Some(ClientCommand::Send(command)) => {
                        let actions = self.manager.send(command);
                        self.apply(actions);
                    }
                    Some(ClientCommand::Shutdown) | None => {
                        let actions = self.manager.shutdown();
                        self.apply(actions);
                        break;
                    }
                },
            }
            self.publish();
        }

        self.publish();
        self.timers.shutdown().await;
        tracing::info!("Connection driver finished");
    }

    fn apply(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::OpenSocket { epoch } => match self.socket.as_mut() {
                    Some(socket) => socket.open(epoch),
                    None => tracing::warn!("No socket transport available to open"),
                },
                Action::SendSocket(wire) => {
                    let Some(socket) = self.socket.as_mut() else {
                        continue;
                    };
                    if let Err(e) = socket.send(wire) {
                        tracing::debug!("Dropping socket frame: {}", e);
                    }
                }
                Action::CloseSocket => {
                    if let Some(socket) = self.socket.as_mut() {
                        socket.close();
                    }
                }
                Action::StartPoll { epoch, query } => self.poll.request(epoch, query),
                Action::AbortPoll => self.poll.abort(),
                Action::ScheduleRetry {
                    transport,
                    epoch,
                    delay,
                } => {
                    self.timers
                        .spawn(retry_timer(self.link_tx.clone(), transport, epoch, delay));
                }
                Action::Dispatch(envelope) => {
                    self.shared.registry.dispatch(&envelope.event, envelope.data);
                }
                Action::FireConnect => {
                    self.shared.registry.fire_connect();
                }
            }
        }
    }

    fn publish(&self) {
        self.shared
            .notify_state_change(self.manager.state(), self.manager.is_connected());
    }
}
