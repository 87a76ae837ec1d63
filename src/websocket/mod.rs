//! WebSocket side of the relay
//!
//! Payload codecs, the per-connection session actor, and the upgrade route.

mod protocol;
mod server;
mod session;

pub use protocol::{ChatMessage, Frame, Payload, Protocol, STRUCTURED_PROTOCOL};
pub use server::relay_route;
pub use session::{Deliver, Evict, RelaySession};
