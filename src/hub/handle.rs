use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::WebSocketError;
use crate::hub::event::HubEvent;
use crate::hub::{ConnectionId, Outbound, Registration};
use crate::websocket::Payload;

/// Cloneable sending side of the hub. Handlers talk to the hub only through this.
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::UnboundedSender<HubEvent>,
}

impl HubHandle {
    pub(crate) fn new(events: mpsc::UnboundedSender<HubEvent>) -> Self {
        Self { events }
    }

    pub fn register(&self, registration: Registration) -> Result<(), WebSocketError> {
        self.send(HubEvent::Register(registration))
    }

    /// Joins the live set. Membership lasts until the returned guard is dropped.
    pub fn join(
        &self,
        id: ConnectionId,
        outbound: Arc<dyn Outbound>,
    ) -> Result<Membership, WebSocketError> {
        self.register(Registration::Join { id, outbound })?;
        Ok(Membership {
            id,
            hub: self.clone(),
        })
    }

    pub fn leave(&self, id: ConnectionId) -> Result<(), WebSocketError> {
        self.register(Registration::Leave { id })
    }

    pub fn submit(&self, payload: Payload) -> Result<(), WebSocketError> {
        self.send(HubEvent::Submit(payload))
    }

    /// Size of the live set, answered in order with every event queued before it.
    pub async fn connection_count(&self) -> Result<usize, WebSocketError> {
        let (tx, rx) = oneshot::channel();
        self.send(HubEvent::Inspect(tx))?;
        rx.await.map_err(|_| WebSocketError::HubUnavailable)
    }

    fn send(&self, event: HubEvent) -> Result<(), WebSocketError> {
        self.events
            .send(event)
            .map_err(|_| WebSocketError::HubUnavailable)
    }
}

/// Scoped live-set membership. Dropping it sends the matching leave event.
pub struct Membership {
    id: ConnectionId,
    hub: HubHandle,
}

impl Drop for Membership {
    fn drop(&mut self) {
        if let Err(e) = self.hub.leave(self.id) {
            debug!("Leave for connection {} not delivered: {}", self.id, e);
        }
    }
}
