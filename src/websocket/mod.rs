//! WebSocket transport for the chat room
//!
//! Wire protocol, per-connection session actors, and the connection pool
//! the hub fans events out through.

mod connection;
mod pool;
mod protocol;
mod server;

pub use connection::{Deliver, WsSession};
pub use pool::{ConnectionId, ConnectionPool, ConnectionState, EventSink};
#[cfg(test)]
pub use pool::MockEventSink;
pub use protocol::{ChatMessage, ClientEvent, ServerEvent, TypingNotice};
pub use server::websocket_route;
