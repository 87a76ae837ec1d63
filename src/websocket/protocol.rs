use actix_web::http::header::{HeaderMap, SEC_WEBSOCKET_PROTOCOL};
use serde::{Deserialize, Serialize};

use crate::error::WebSocketError;

/// Subprotocol a client offers to speak structured JSON chat messages.
pub const STRUCTURED_PROTOCOL: &str = "relay.json";

/// A websocket data frame as the relay sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Frame::Text(text) => text.into_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }
}

/// Structured chat message, `{"Text": .., "Id": .., "User": ..}` on the wire.
/// Missing fields take their zero value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ChatMessage {
    pub text: String,
    pub id: i64,
    pub user: String,
}

/// The unit of broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Structured(ChatMessage),
    Raw(Frame),
}

impl Payload {
    /// Outbound frame for this payload. Raw frames pass through untouched.
    pub fn to_frame(&self) -> Result<Frame, WebSocketError> {
        match self {
            Payload::Structured(message) => serde_json::to_string(message)
                .map(Frame::Text)
                .map_err(|e| WebSocketError::InvalidFormat(e.to_string())),
            Payload::Raw(frame) => Ok(frame.clone()),
        }
    }
}

/// Payload codec negotiated per connection at handshake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// JSON `ChatMessage` frames. Anything that does not decode ends the connection.
    Structured,
    /// Opaque text or binary frames.
    Raw,
}

impl Protocol {
    /// Structured when the upgrade request offers [`STRUCTURED_PROTOCOL`], raw otherwise.
    pub fn negotiate(headers: &HeaderMap) -> Self {
        let offered = headers
            .get_all(SEC_WEBSOCKET_PROTOCOL)
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|name| name.trim() == STRUCTURED_PROTOCOL);

        if offered {
            Protocol::Structured
        } else {
            Protocol::Raw
        }
    }

    pub fn decode(self, frame: Frame) -> Result<Payload, WebSocketError> {
        match self {
            Protocol::Structured => serde_json::from_slice::<ChatMessage>(&frame.into_bytes())
                .map(Payload::Structured)
                .map_err(|e| WebSocketError::InvalidFormat(e.to_string())),
            Protocol::Raw => Ok(Payload::Raw(frame)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Protocol::Structured => STRUCTURED_PROTOCOL,
            Protocol::Raw => "raw",
        }
    }
}
