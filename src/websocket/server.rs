use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tracing::info;

use crate::websocket::WsSession;
use crate::AppState;

/// Upgrades `GET /ws` and hands the socket to a new session actor.
pub async fn websocket_route(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let peer_addr = req.peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    info!("New WebSocket connection request from: {}", peer_addr);

    ws::start(
        WsSession::new(state.hub.clone(), peer_addr, &state.config.hub),
        &req,
        stream,
    )
}
