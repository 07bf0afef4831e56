//! Dispatch errors.

use thiserror::Error;

/// Errors raised by the local dispatcher and the protocol map.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("No handler registered for {0}")]
    NoHandler(String),
    #[error("Handler for {message_type} failed: {source}")]
    Handler {
        message_type: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to decode {message_type} payload: {source}")]
    Decode {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to encode {message_type} payload: {source}")]
    Encode {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DispatchError {
    pub(crate) fn decode(message_type: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            message_type: message_type.into(),
            source,
        }
    }

    pub(crate) fn encode(message_type: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Encode {
            message_type: message_type.into(),
            source,
        }
    }
}
