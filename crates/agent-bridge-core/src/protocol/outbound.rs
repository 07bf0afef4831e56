//! Client → backend payloads and their responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{OutboundMessage, OutboundType};

/// Chat session summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Start a chat session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl OutboundMessage for CreateSession {
    const TYPE: OutboundType = OutboundType::CreateSession;
    type Response = SessionInfo;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl OutboundMessage for ListSessions {
    const TYPE: OutboundType = OutboundType::ListSessions;
    type Response = Vec<SessionInfo>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSession {
    pub session_id: String,
}

impl OutboundMessage for GetSession {
    const TYPE: OutboundType = OutboundType::GetSession;
    type Response = SessionInfo;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSession {
    pub session_id: String,
}

impl OutboundMessage for DeleteSession {
    const TYPE: OutboundType = OutboundType::DeleteSession;
    type Response = ();
}

/// Body of a chat turn as the backend expects it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Post a chat turn into a session.
///
/// The session id only addresses the endpoint; `request` alone is sent as
/// the HTTP body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub session_id: String,
    pub request: ChatRequest,
}

impl OutboundMessage for SendMessage {
    const TYPE: OutboundType = OutboundType::SendMessage;
    type Response = ChatMessage;
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message_id: String,
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessages {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

impl OutboundMessage for GetMessages {
    const TYPE: OutboundType = OutboundType::GetMessages;
    type Response = Vec<ChatMessage>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTools {}

impl OutboundMessage for ListTools {
    const TYPE: OutboundType = OutboundType::ListTools;
    type Response = Vec<ToolDescriptor>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
    #[serde(default)]
    pub requires_approval: bool,
}

/// Run a tool on the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTool {
    pub tool_name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl OutboundMessage for ExecuteTool {
    const TYPE: OutboundType = OutboundType::ExecuteTool;
    type Response = ToolExecution;
}

/// Lifecycle of a tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStatus {
    Pending,
    AwaitingApproval,
    Running,
    Completed,
    Failed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    pub execution_id: String,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListApprovals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl OutboundMessage for ListApprovals {
    const TYPE: OutboundType = OutboundType::ListApprovals;
    type Response = Vec<PendingApproval>;
}

/// A tool execution waiting for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    pub execution_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveExecution {
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl OutboundMessage for ApproveExecution {
    const TYPE: OutboundType = OutboundType::Approve;
    type Response = ApprovalDecision;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectExecution {
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OutboundMessage for RejectExecution {
    const TYPE: OutboundType = OutboundType::Reject;
    type Response = ApprovalDecision;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    pub execution_id: String,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetWorkflowState {
    pub session_id: String,
}

impl OutboundMessage for GetWorkflowState {
    const TYPE: OutboundType = OutboundType::GetWorkflowState;
    type Response = WorkflowState;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitWorkflowFeedback {
    pub session_id: String,
    pub feedback: String,
    #[serde(default)]
    pub veto: bool,
}

impl OutboundMessage for SubmitWorkflowFeedback {
    const TYPE: OutboundType = OutboundType::SubmitWorkflowFeedback;
    type Response = WorkflowState;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub session_id: String,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetDomainGraph {}

impl OutboundMessage for GetDomainGraph {
    const TYPE: OutboundType = OutboundType::GetDomainGraph;
    type Response = DomainGraph;
}

/// Opaque graph snapshot; node and edge shapes belong to the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainGraph {
    #[serde(default)]
    pub nodes: Vec<Value>,
    #[serde(default)]
    pub edges: Vec<Value>,
}

/// Liveness probe. Sent as `HEAD`, so the reply carries no payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthCheck {}

impl OutboundMessage for HealthCheck {
    const TYPE: OutboundType = OutboundType::HealthCheck;
    type Response = ();
}
