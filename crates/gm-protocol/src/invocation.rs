use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Agent-facing tool invocation: a tool name plus JSON arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Unique invocation ID (UUIDv7 for time-sortability).
    pub id: Uuid,
    /// Registered tool name (e.g., "get_usage_by_user").
    pub tool_name: String,
    /// Arguments as a JSON object.
    #[serde(default)]
    pub args: serde_json::Value,
    /// When the agent issued the call.
    pub requested_at: DateTime<Utc>,
}

impl ToolInvocation {
    pub fn new(tool_name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            tool_name: tool_name.into(),
            args,
            requested_at: Utc::now(),
        }
    }
}

/// Result handed back to the agent for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// ID of the originating invocation.
    pub invocation_id: Uuid,
    pub tool_name: String,
    /// Whether the tool produced a result (an unresolved reference counts as success).
    pub success: bool,
    /// Structured result data (JSON).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Human-readable summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Error message if success is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the caller may retry the failure with backoff.
    #[serde(default)]
    pub retryable: bool,
    pub latency_ms: u64,
}

impl ToolOutcome {
    pub fn success(
        invocation: &ToolInvocation,
        data: serde_json::Value,
        summary: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            invocation_id: invocation.id,
            tool_name: invocation.tool_name.clone(),
            success: true,
            data: Some(data),
            summary: Some(summary.into()),
            error: None,
            retryable: false,
            latency_ms,
        }
    }

    pub fn failure(
        invocation: &ToolInvocation,
        error: impl Into<String>,
        retryable: bool,
        latency_ms: u64,
    ) -> Self {
        Self {
            invocation_id: invocation.id,
            tool_name: invocation.tool_name.clone(),
            success: false,
            data: None,
            summary: None,
            error: Some(error.into()),
            retryable,
            latency_ms,
        }
    }
}
