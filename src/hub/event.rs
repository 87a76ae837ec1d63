use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::hub::Outbound;
use crate::websocket::Payload;

/// Identity of one client connection for the whole of its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A request to add a connection to, or remove it from, the live set.
pub enum Registration {
    Join {
        id: ConnectionId,
        outbound: Arc<dyn Outbound>,
    },
    Leave {
        id: ConnectionId,
    },
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Registration::Join { id, .. } => f.debug_struct("Join").field("id", id).finish(),
            Registration::Leave { id } => f.debug_struct("Leave").field("id", id).finish(),
        }
    }
}

/// Everything the hub loop consumes, on a single ordered channel.
pub(crate) enum HubEvent {
    Register(Registration),
    Submit(Payload),
    Inspect(oneshot::Sender<usize>),
}
