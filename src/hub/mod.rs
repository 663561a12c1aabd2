//! Presence & broadcast hub
//!
//! One task owns the presence table and the connection pool and drains a
//! command queue one command at a time. Every handler runs to completion,
//! fan-out included, before the next command is looked at.

mod presence;

pub use presence::PresenceTable;

use std::ops::ControlFlow;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::HubError;
use crate::websocket::{
    ChatMessage, ClientEvent, ConnectionId, ConnectionPool, ConnectionState, EventSink,
    ServerEvent, TypingNotice,
};

pub enum HubCommand {
    Connect { id: ConnectionId, sink: Box<dyn EventSink> },
    Inbound { id: ConnectionId, event: ClientEvent },
    Disconnect { id: ConnectionId },
    Stats { reply: oneshot::Sender<HubStats> },
    Shutdown { done: oneshot::Sender<()> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub participants: Vec<String>,
}

pub struct Hub {
    presence: PresenceTable,
    pool: ConnectionPool,
    require_registration: bool,
}

impl Hub {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            presence: PresenceTable::new(),
            pool: ConnectionPool::new(),
            require_registration: config.require_registration,
        }
    }

    /// Start the dispatch loop on the current runtime.
    pub fn spawn(self) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (HubHandle { tx }, task)
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
        info!("Hub started");

        while let Some(command) = rx.recv().await {
            if self.handle(command).is_break() {
                return;
            }
        }

        info!("Hub stopped: all handles dropped");
    }

    /// Applies one command. `Break` means the hub has acknowledged a
    /// shutdown and must not process anything further.
    pub fn handle(&mut self, command: HubCommand) -> ControlFlow<()> {
        match command {
            HubCommand::Connect { id, sink } => self.connect(id, sink),
            HubCommand::Inbound { id, event } => self.dispatch(id, event),
            HubCommand::Disconnect { id } => self.disconnect(id),
            HubCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            HubCommand::Shutdown { done } => {
                info!(
                    "Hub shutting down with {} connections, {} participants",
                    self.pool.connection_count(),
                    self.presence.len()
                );
                let _ = done.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.pool.connection_count(),
            participants: self.presence.snapshot(),
        }
    }

    fn connect(&mut self, id: ConnectionId, sink: Box<dyn EventSink>) {
        if !self.pool.add(id, sink) {
            warn!("Connection {} is already live, ignoring duplicate connect", id);
        }
    }

    fn dispatch(&mut self, id: ConnectionId, event: ClientEvent) {
        let Some(state) = self.pool.state(&id) else {
            debug!("Dropping {} from closed connection {}", event.kind(), id);
            return;
        };

        match event {
            ClientEvent::Register(display_name) => self.register(id, display_name),
            ClientEvent::SendMessage(message) => {
                if self.accepts_chatter(id, state, "send-message") {
                    self.send_message(id, message);
                }
            }
            ClientEvent::Typing(notice) => {
                if self.accepts_chatter(id, state, "typing") {
                    self.typing(id, notice);
                }
            }
        }
    }

    fn accepts_chatter(&self, id: ConnectionId, state: ConnectionState, kind: &str) -> bool {
        if self.require_registration && state != ConnectionState::Active {
            debug!("Dropping {} from unregistered connection {}", kind, id);
            return false;
        }
        true
    }

    fn register(&mut self, id: ConnectionId, display_name: String) {
        match self.presence.register(id, display_name.clone()) {
            Some(previous) => info!("Connection {} renamed {} -> {}", id, previous, display_name),
            None => info!("Connection {} joined as {}", id, display_name),
        }
        self.pool.activate(&id);

        self.pool.broadcast(&ServerEvent::RosterUpdated(self.presence.snapshot()), None);
        self.pool.broadcast(&ServerEvent::ParticipantJoined, None);
    }

    fn send_message(&self, id: ConnectionId, message: ChatMessage) {
        let delivered = self.pool.broadcast(&ServerEvent::MessageReceived(message), None);
        debug!("Message from {} delivered to {} connections", id, delivered);
    }

    fn typing(&self, id: ConnectionId, notice: TypingNotice) {
        self.pool.broadcast(&ServerEvent::TypingNotice(notice), Some(id));
    }

    /// Leave notice first, then the roster without the departed name.
    fn disconnect(&mut self, id: ConnectionId) {
        if !self.pool.remove(&id) {
            debug!("Ignoring disconnect for unknown connection {}", id);
            return;
        }

        match self.presence.remove(&id) {
            Some(name) => info!("Connection {} ({}) left", id, name),
            None => info!("Connection {} left without registering", id),
        }

        self.pool.broadcast(&ServerEvent::ParticipantLeft, None);
        self.pool.broadcast(&ServerEvent::RosterUpdated(self.presence.snapshot()), None);
    }
}

/// Cloneable entry point to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.tx.send(command).map_err(|_| HubError::Unavailable)
    }

    pub fn connect(&self, id: ConnectionId, sink: Box<dyn EventSink>) -> Result<(), HubError> {
        self.send(HubCommand::Connect { id, sink })
    }

    pub fn dispatch(&self, id: ConnectionId, event: ClientEvent) -> Result<(), HubError> {
        self.send(HubCommand::Inbound { id, event })
    }

    pub fn disconnect(&self, id: ConnectionId) -> Result<(), HubError> {
        self.send(HubCommand::Disconnect { id })
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats { reply })?;
        rx.await.map_err(|_| HubError::Unavailable)
    }

    pub async fn shutdown(&self) -> Result<(), HubError> {
        let (done, rx) = oneshot::channel();
        self.send(HubCommand::Shutdown { done })?;
        rx.await.map_err(|_| HubError::Unavailable)
    }
}
