use std::time::{Duration, Instant};
use actix::prelude::*;
use actix_web_actors::ws;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::HubConfig;
use crate::error::WebSocketError;
use crate::hub::HubHandle;
use crate::websocket::{ClientEvent, ConnectionId, EventSink, ServerEvent};

/// Outbound event addressed to one session actor.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct Deliver(pub ServerEvent);

/// Queues regardless of mailbox capacity; the hub fans out faster than a
/// session drains, and only a closed session counts as undeliverable.
impl EventSink for Recipient<Deliver> {
    fn deliver(&self, event: &ServerEvent) -> Result<(), WebSocketError> {
        if !self.connected() {
            return Err(WebSocketError::ConnectionClosed);
        }
        self.do_send(Deliver(event.clone()));
        Ok(())
    }
}

/// One live websocket. Translates frames into hub commands and hub
/// broadcasts back into frames.
pub struct WsSession {
    id: ConnectionId,
    peer_addr: String,
    hub: HubHandle,
    last_heartbeat: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    pub fn new(hub: HubHandle, peer_addr: String, config: &HubConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer_addr,
            hub,
            last_heartbeat: Instant::now(),
            heartbeat_interval: config.heartbeat_interval(),
            client_timeout: config.client_timeout(),
        }
    }

    fn handle_text(&mut self, text: &str) {
        match ClientEvent::parse(text) {
            Ok(event) => {
                debug!("Received {} from {} (id: {})", event.kind(), self.peer_addr, self.id);
                if let Err(e) = self.hub.dispatch(self.id, event) {
                    error!("Failed to forward event from {}: {}", self.id, e);
                }
            }
            Err(e) => {
                warn!("Dropping frame from {} (id: {}): {}", self.peer_addr, self.id, e);
            }
        }
    }

    /// Ping on every tick; stop the session once nothing has been heard
    /// from the client for `client_timeout`.
    fn start_heartbeat(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!("Heartbeat timeout for connection {} ({}), evicting", act.id, act.peer_addr);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket connection established with {} (id: {})", self.peer_addr, self.id);
        self.start_heartbeat(ctx);

        let sink: Box<dyn EventSink> = Box::new(ctx.address().recipient::<Deliver>());
        if let Err(e) = self.hub.connect(self.id, sink) {
            error!("Could not attach connection {} to hub: {}", self.id, e);
            ctx.stop();
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("WebSocket connection closed with {} (id: {})", self.peer_addr, self.id);
        if let Err(e) = self.hub.disconnect(self.id) {
            warn!("Hub missed disconnect for {}: {}", self.id, e);
        }
    }
}

impl Handler<Deliver> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        match msg.0.to_json() {
            Ok(json) => ctx.text(json),
            Err(e) => error!("Failed to serialize server event: {}", e),
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text);
            }
            Ok(ws::Message::Binary(bin)) => {
                warn!("Ignoring binary frame of {} bytes from {}", bin.len(), self.peer_addr);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed from {}: {:?}", self.peer_addr, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error handling WebSocket message from {}: {}", self.peer_addr, e);
                ctx.stop();
            }
        }
    }
}
