//! Backend → client push payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ExecutionStatus, InboundMessage, InboundType};

/// Incremental change to the domain graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainGraphUpdate {
    #[serde(default)]
    pub nodes: Vec<Value>,
    #[serde(default)]
    pub edges: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
}

impl InboundMessage for DomainGraphUpdate {
    const TYPE: InboundType = InboundType::DomainGraphUpdate;
}

/// Streaming chat activity for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    pub session_id: String,
    /// Event kind, e.g. `message-delta` or `message-complete`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl InboundMessage for ChatEvent {
    const TYPE: InboundType = InboundType::ChatEvent;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEvent {
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InboundMessage for ToolEvent {
    const TYPE: InboundType = InboundType::ToolEvent;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    #[default]
    Info,
    Warning,
    Error,
}

/// Ask the host to surface a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationShow {
    pub message: String,
    #[serde(default)]
    pub level: NotificationLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl InboundMessage for NotificationShow {
    const TYPE: InboundType = InboundType::NotificationShow;
}

/// Workflow state change. All named workflow stream events arrive as this
/// one type; `kind` carries the backend's event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl InboundMessage for WorkflowEvent {
    const TYPE: InboundType = InboundType::WorkflowEvent;
}
