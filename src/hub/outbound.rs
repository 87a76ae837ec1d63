use async_trait::async_trait;

use crate::error::WebSocketError;
use crate::websocket::Payload;

/// The write side of a connection as seen by the hub.
///
/// The hub only ever holds this reference; the connection itself stays owned
/// by its handler, which is also the only party allowed to close it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Writes one message to the connection. Any error is terminal for the
    /// connection's membership.
    async fn deliver(&self, payload: &Payload) -> Result<(), WebSocketError>;

    /// Called once after the hub dropped the connection from its live set.
    fn evict(&self) {}
}
