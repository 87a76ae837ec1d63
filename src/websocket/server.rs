use actix_web::{web, HttpRequest, HttpResponse, Error};
use actix_web_actors::ws;
use tracing::info;

use crate::websocket::{Protocol, RelaySession, STRUCTURED_PROTOCOL};
use crate::AppState;

/// Upgrades the request to a websocket and starts a [`RelaySession`] for it.
///
/// The payload protocol is picked from the upgrade request's
/// `Sec-WebSocket-Protocol` header; structured clients get the subprotocol
/// echoed back in the handshake response.
pub async fn relay_route(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let peer_addr = req.peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let protocol = Protocol::negotiate(req.headers());
    info!("New WebSocket connection request from {} ({})", peer_addr, protocol.name());

    let session = RelaySession::new(state.hub.clone(), protocol, peer_addr);
    let builder = ws::WsResponseBuilder::new(session, &req, stream);
    match protocol {
        Protocol::Structured => builder.protocols(&[STRUCTURED_PROTOCOL]).start(),
        Protocol::Raw => builder.start(),
    }
}
