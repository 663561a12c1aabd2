use std::collections::HashMap;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::WebSocketError;
use crate::websocket::ServerEvent;

pub type ConnectionId = Uuid;

/// Outbound side of one live connection.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send {
    fn deliver(&self, event: &ServerEvent) -> Result<(), WebSocketError>;
}

/// Channel-backed sink, for transports that drain a queue themselves.
impl EventSink for mpsc::UnboundedSender<ServerEvent> {
    fn deliver(&self, event: &ServerEvent) -> Result<(), WebSocketError> {
        self.send(event.clone())
            .map_err(|_| WebSocketError::ConnectionClosed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport established, no `register` yet.
    Connected,
    /// Registered and part of the roster.
    Active,
}

struct PooledConnection {
    sink: Box<dyn EventSink>,
    state: ConnectionState,
    connected_at: DateTime<Utc>,
}

/// Registry of live connections. Owned by the hub and only touched from its
/// dispatch loop, so it needs no locking.
#[derive(Default)]
pub struct ConnectionPool {
    connections: HashMap<ConnectionId, PooledConnection>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the id was already live; the existing sink is kept.
    pub fn add(&mut self, id: ConnectionId, sink: Box<dyn EventSink>) -> bool {
        if self.connections.contains_key(&id) {
            return false;
        }
        self.connections.insert(id, PooledConnection {
            sink,
            state: ConnectionState::Connected,
            connected_at: Utc::now(),
        });
        info!("Added connection {} to pool", id);
        true
    }

    pub fn remove(&mut self, id: &ConnectionId) -> bool {
        match self.connections.remove(id) {
            Some(conn) => {
                let lifetime = Utc::now() - conn.connected_at;
                info!("Removed connection {} from pool after {}s", id, lifetime.num_seconds());
                true
            }
            None => false,
        }
    }

    pub fn state(&self, id: &ConnectionId) -> Option<ConnectionState> {
        self.connections.get(id).map(|conn| conn.state)
    }

    pub fn activate(&mut self, id: &ConnectionId) {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.state = ConnectionState::Active;
        }
    }

    /// Deliver to every live connection except `exclude_id`. A failing
    /// recipient is logged and skipped. Returns the number of successful
    /// deliveries.
    pub fn broadcast(&self, event: &ServerEvent, exclude_id: Option<ConnectionId>) -> usize {
        let mut delivered = 0;

        for (id, conn) in self.connections.iter() {
            if let Some(exclude) = exclude_id {
                if *id == exclude {
                    continue;
                }
            }

            match conn.sink.deliver(event) {
                Ok(()) => delivered += 1,
                Err(e) => error!("Failed to broadcast to connection {}: {}", id, e),
            }
        }

        debug!("Broadcast delivered to {}/{} connections", delivered, self.connections.len());
        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
