//! Message envelope shared by both dispatch directions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A typed message travelling through the dispatcher.
///
/// `message_id` exists for correlation and tracing only. Each request owns
/// its own round-trip, so ids are never used to multiplex replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message<T = Value> {
    /// Protocol message type, e.g. `chat/event`.
    pub message_type: String,
    /// Correlation id.
    pub message_id: String,
    /// Payload.
    pub data: T,
}

impl<T> Message<T> {
    /// Build a message, generating a UUID when no id is supplied.
    #[must_use]
    pub fn new(message_type: impl Into<String>, data: T, message_id: Option<String>) -> Self {
        Self {
            message_type: message_type.into(),
            message_id: message_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            data,
        }
    }

    /// Replace the payload, keeping type and id.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Message<U> {
        Message {
            message_type: self.message_type,
            message_id: self.message_id,
            data: f(self.data),
        }
    }
}
