//! Protocol map: message-type names paired with their payload types.
//!
//! Outbound types travel client → backend and expect exactly one reply.
//! Inbound types are backend → client push events. The two directions are
//! separate enums so a type from one can never be used with the other.

use std::{fmt, str::FromStr};

use serde::{Serialize, de::DeserializeOwned};

use crate::DispatchError;

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;

/// Client → backend message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundType {
    CreateSession,
    ListSessions,
    GetSession,
    DeleteSession,
    SendMessage,
    GetMessages,
    ListTools,
    ExecuteTool,
    ListApprovals,
    Approve,
    Reject,
    GetWorkflowState,
    SubmitWorkflowFeedback,
    GetDomainGraph,
    HealthCheck,
}

impl OutboundType {
    /// Every outbound type, in table order.
    pub const ALL: &'static [Self] = &[
        Self::CreateSession,
        Self::ListSessions,
        Self::GetSession,
        Self::DeleteSession,
        Self::SendMessage,
        Self::GetMessages,
        Self::ListTools,
        Self::ExecuteTool,
        Self::ListApprovals,
        Self::Approve,
        Self::Reject,
        Self::GetWorkflowState,
        Self::SubmitWorkflowFeedback,
        Self::GetDomainGraph,
        Self::HealthCheck,
    ];

    /// Wire name of the message type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateSession => "chat/create-session",
            Self::ListSessions => "chat/list-sessions",
            Self::GetSession => "chat/get-session",
            Self::DeleteSession => "chat/delete-session",
            Self::SendMessage => "chat/send-message",
            Self::GetMessages => "chat/get-messages",
            Self::ListTools => "tool/list",
            Self::ExecuteTool => "tool/execute",
            Self::ListApprovals => "approval/list",
            Self::Approve => "approval/approve",
            Self::Reject => "approval/reject",
            Self::GetWorkflowState => "workflow/get-state",
            Self::SubmitWorkflowFeedback => "workflow/submit-feedback",
            Self::GetDomainGraph => "domain-graph/get",
            Self::HealthCheck => "health/check",
        }
    }
}

/// Backend → client message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundType {
    DomainGraphUpdate,
    ChatEvent,
    ToolEvent,
    NotificationShow,
    WorkflowEvent,
}

impl InboundType {
    /// Every inbound type.
    pub const ALL: &'static [Self] = &[
        Self::DomainGraphUpdate,
        Self::ChatEvent,
        Self::ToolEvent,
        Self::NotificationShow,
        Self::WorkflowEvent,
    ];

    /// Wire name of the message type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DomainGraphUpdate => "domain-graph/update",
            Self::ChatEvent => "chat/event",
            Self::ToolEvent => "tool/event",
            Self::NotificationShow => "notification/show",
            Self::WorkflowEvent => "workflow/event",
        }
    }
}

fn lookup<T: Copy>(all: &[T], name: &str, as_str: impl Fn(T) -> &'static str) -> Option<T> {
    all.iter().copied().find(|t| as_str(*t) == name)
}

impl FromStr for OutboundType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(Self::ALL, s, Self::as_str)
            .ok_or_else(|| DispatchError::UnknownMessageType(s.to_string()))
    }
}

impl FromStr for InboundType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(Self::ALL, s, Self::as_str)
            .ok_or_else(|| DispatchError::UnknownMessageType(s.to_string()))
    }
}

impl fmt::Display for OutboundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for InboundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request payload paired with the response it produces.
pub trait OutboundMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Message type this payload is sent as.
    const TYPE: OutboundType;
    /// Payload returned by the backend.
    type Response: Serialize + DeserializeOwned + Send + 'static;
}

/// A push event payload.
pub trait InboundMessage: Serialize + DeserializeOwned + Send + 'static {
    /// Message type this payload arrives as.
    const TYPE: InboundType;
}
