use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use actix_web_actors::ws;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::WebSocketError;
use crate::hub::{ConnectionId, HubHandle, Membership, Outbound};
use crate::websocket::{Frame, Payload, Protocol};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(40);

/// Frame pushed to the client by the hub's delivery pass.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Deliver(pub Frame);

/// The hub dropped this connection from its live set.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Evict;

/// Per-connection handler: reads frames from one client, relays them to the
/// hub, and writes whatever the hub delivers back to it.
pub struct RelaySession {
    id: ConnectionId,
    peer_addr: String,
    protocol: Protocol,
    hub: HubHandle,
    membership: Option<Membership>,
    last_heartbeat: Instant,
}

impl RelaySession {
    pub fn new(hub: HubHandle, protocol: Protocol, peer_addr: String) -> Self {
        Self {
            id: ConnectionId::new(),
            peer_addr,
            protocol,
            hub,
            membership: None,
            last_heartbeat: Instant::now(),
        }
    }

    /// Decode one inbound frame and hand it to the hub.
    fn relay(&mut self, frame: Frame, ctx: &mut <Self as Actor>::Context) {
        let payload = match self.protocol.decode(frame) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dropping connection {} from {}: {}", self.id, self.peer_addr, e);
                ctx.stop();
                return;
            }
        };

        if let Err(e) = self.hub.submit(payload) {
            error!("Connection {} could not submit: {}", self.id, e);
            ctx.stop();
        }
    }

    fn start_heartbeat(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > HEARTBEAT_TIMEOUT {
                warn!("Heartbeat timeout for connection {} ({})", act.id, act.peer_addr);
                ctx.stop();
                return;
            }

            ctx.ping(b"");
        });
    }
}

impl Actor for RelaySession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            "WebSocket connection established with {} (id: {}, protocol: {})",
            self.peer_addr,
            self.id,
            self.protocol.name()
        );

        // Join before the first inbound frame is handled.
        let outbound = Arc::new(SessionOutbound { addr: ctx.address() });
        match self.hub.join(self.id, outbound) {
            Ok(membership) => self.membership = Some(membership),
            Err(e) => {
                error!("Connection {} could not join the hub: {}", self.id, e);
                ctx.stop();
                return;
            }
        }

        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Dropping the guard sends the leave event.
        self.membership.take();
        info!("WebSocket connection closed with {} (id: {})", self.peer_addr, self.id);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RelaySession {
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
                self.relay(Frame::Text(text.to_string()), ctx);
            }
            Ok(ws::Message::Binary(bin)) => {
                self.relay(Frame::Binary(bin.to_vec()), ctx);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed from {}: {:?}", self.peer_addr, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Unsupported continuation frame from {}", self.peer_addr);
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                error!("Error reading WebSocket message from {}: {}", self.peer_addr, e);
                ctx.stop();
            }
        }
    }
}

impl Handler<Deliver> for RelaySession {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        match msg.0 {
            Frame::Text(text) => ctx.text(text),
            Frame::Binary(bytes) => ctx.binary(bytes),
        }
    }
}

impl Handler<Evict> for RelaySession {
    type Result = ();

    fn handle(&mut self, _msg: Evict, ctx: &mut Self::Context) {
        debug!("Connection {} evicted by the hub", self.id);
        ctx.stop();
    }
}

/// Hub-side reference to a session: writes go through the actor mailbox.
struct SessionOutbound {
    addr: Addr<RelaySession>,
}

#[async_trait]
impl Outbound for SessionOutbound {
    async fn deliver(&self, payload: &Payload) -> Result<(), WebSocketError> {
        let frame = payload.to_frame()?;
        self.addr
            .send(Deliver(frame))
            .await
            .map_err(|e| WebSocketError::SendError(e.to_string()))
    }

    fn evict(&self) {
        self.addr.do_send(Evict);
    }
}
