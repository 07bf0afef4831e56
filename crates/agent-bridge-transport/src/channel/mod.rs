//! Push channels: one long-lived event stream each, with reconnection.
//!
//! [`ChannelMachine`] holds the connection state as a plain value and
//! decides every transition; [`ChannelController`] runs its effects on
//! tokio.

mod controller;
mod machine;

use std::fmt;

use agent_bridge_core::InboundType;
use serde_json::Value;

pub use controller::{ChannelController, ChannelSnapshot};
pub use machine::{ChannelEffect, ChannelEvent, ChannelMachine, ChannelPhase, ConnectionId};

/// Named events carried by the primary channel.
pub const PRIMARY_EVENTS: &[&str] = &[
    "domain-graph/update",
    "chat/event",
    "tool/event",
    "notification/show",
];

/// Workflow-state event names the backend may use instead of
/// `workflow/event`.
pub const WORKFLOW_STATE_EVENTS: &[&str] = &[
    "WORKFLOW_STARTED",
    "DRAFT_UPDATED",
    "PROPOSAL_READY",
    "VETO_APPLIED",
    "FEEDBACK_REQUESTED",
    "PHASE_CHANGED",
    "WORKFLOW_COMPLETED",
    "WORKFLOW_FAILED",
];

/// Which push channel a controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Graph, chat, tool and notification events.
    Primary,
    /// Workflow state events.
    Workflow,
}

impl ChannelKind {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Workflow => "workflow",
        }
    }

    /// Stream path relative to the base URL.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Primary => "/sse/events",
            Self::Workflow => "/workflow/events",
        }
    }

    /// Inbound type a stream event name is dispatched as, if this channel
    /// listens for it.
    #[must_use]
    pub fn route(self, event: &str) -> Option<InboundType> {
        match self {
            Self::Primary => PRIMARY_EVENTS
                .contains(&event)
                .then(|| event.parse().ok())
                .flatten(),
            Self::Workflow => (event == InboundType::WorkflowEvent.as_str()
                || WORKFLOW_STATE_EVENTS.contains(&event))
            .then_some(InboundType::WorkflowEvent),
        }
    }

    /// Final payload handed to the dispatcher.
    ///
    /// Workflow payloads without a `type` field record the stream event
    /// name there, so handlers can tell the funnelled names apart.
    #[must_use]
    pub fn prepare_payload(self, event: &str, payload: Value) -> Value {
        match (self, payload) {
            (Self::Workflow, Value::Object(mut map)) => {
                map.entry("type")
                    .or_insert_with(|| Value::String(event.to_string()));
                Value::Object(map)
            }
            (_, payload) => payload,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
