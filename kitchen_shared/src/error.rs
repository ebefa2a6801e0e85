//! Error taxonomy.
//!
//! Transport and decode errors drop the offending message; asset and logic
//! errors skip a single entity. None of them trigger a reconnect.

use thiserror::Error;

/// Handshake request failures and channel errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request to {url} failed: {reason}")]
    Http { url: String, reason: String },
    #[error("http request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("channel closed")]
    Closed,
    #[error("cannot open channel at {0:?}")]
    Refused(String),
    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
}

/// Malformed inbound payloads.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has no \"type\" discriminator")]
    MissingTag,
}

/// No visual is registered for an entity's kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no visual registered for {kind:?} (entity {id})")]
pub struct AssetError {
    pub kind: String,
    pub id: String,
}

/// Inconsistent references or operations issued in the wrong state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogicError {
    #[error("item {item} references unknown container {container}")]
    UnknownContainer { item: String, container: String },
    #[error("operation requires {expected}, connection is {actual}")]
    InvalidState {
        expected: &'static str,
        actual: String,
    },
    #[error("connection info contained no player slot")]
    NoPlayerSlot,
    #[error("player {0} is not controlled by this client")]
    UnknownLocalPlayer(String),
}

/// Umbrella error for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Logic(#[from] LogicError),
}

impl ClientError {
    /// Whether this error leaves the connection unusable.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}
