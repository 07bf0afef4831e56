//! Transport error types.

use agent_bridge_core::DispatchError;
use thiserror::Error;

/// Errors surfaced by the network transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Message type has no endpoint.
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// The HTTP call itself failed (DNS, connect, reset, timeout).
    #[error("Network error: {message}")]
    Network {
        /// Error message.
        message: String,
    },

    /// Backend answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code.
        status: u16,
        /// Message parsed from the error body, or the status text.
        message: String,
    },

    /// Backend rejected the request inside a well-formed envelope.
    #[error("Backend error: {message}")]
    Application {
        /// Machine-readable error code, when supplied.
        code: Option<String>,
        /// Error message, falling back to the code.
        message: String,
    },

    /// Response body could not be parsed.
    #[error("Failed to parse {context}: {message}")]
    Decode {
        /// What was being parsed.
        context: String,
        /// Parser error.
        message: String,
    },

    /// Request payload could not be serialized.
    #[error("Failed to encode {message_type} payload: {source}")]
    Encode {
        /// Message type being sent.
        message_type: String,
        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// Event stream failed to open or broke while reading.
    #[error("Event stream error: {message}")]
    Stream {
        /// Error message.
        message: String,
    },

    /// Invalid configuration (base URL, header values).
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Local dispatch failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl TransportError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a stream error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// HTTP status when the backend answered with an error status.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
