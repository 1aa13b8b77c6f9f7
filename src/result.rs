//! Tool call results as handed back to the chat loop.
//!
//! `execute` never fails: every outcome, including access and routing
//! errors, is a [`ToolResult`]. `success` is true exactly when `value` is
//! set; otherwise `error` and `error_kind` are.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Fallback message when a tool flags `isError` without any text.
const UNSPECIFIED_TOOL_ERROR: &str = "tool reported an error";

// ─── Error Kinds ─────────────────────────────────────────────────────────────

/// Why a tool call did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// The role is not entitled to the tool.
    AccessDenied,
    /// No server in the role's pool exposes the tool.
    ToolNotFound,
    /// The owning connection is not ready.
    ServerUnavailable,
    /// The call did not finish in time.
    Timeout,
    /// Transport failure or a tool-level error reply.
    ExecutionFailed,
}

impl ToolErrorKind {
    /// Whether the same call might succeed if tried again.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ToolErrorKind::Timeout | ToolErrorKind::ExecutionFailed | ToolErrorKind::ServerUnavailable
        )
    }

    /// Short phrasing for the end user or the model.
    pub fn user_hint(self) -> &'static str {
        match self {
            ToolErrorKind::AccessDenied => "This action is not available for your role.",
            ToolErrorKind::ToolNotFound => "This action is not available.",
            ToolErrorKind::ServerUnavailable => {
                "The service behind this action is unavailable right now; you may retry later."
            }
            ToolErrorKind::Timeout => "This action took too long and was abandoned; you may retry.",
            ToolErrorKind::ExecutionFailed => "This action failed; you may retry.",
        }
    }
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ToolErrorKind::AccessDenied => "access_denied",
            ToolErrorKind::ToolNotFound => "tool_not_found",
            ToolErrorKind::ServerUnavailable => "server_unavailable",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::ExecutionFailed => "execution_failed",
        };
        f.write_str(s)
    }
}

// ─── Call Context ────────────────────────────────────────────────────────────

/// Identity and start time of one `execute` call.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub call_id: String,
    pub tool_name: String,
    pub caller_id: String,
    started: Instant,
}

impl CallContext {
    pub fn new(tool_name: &str, caller_id: &str) -> Self {
        Self {
            call_id: format!("call_{}", uuid::Uuid::new_v4()),
            tool_name: tool_name.to_string(),
            caller_id: caller_id.to_string(),
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

// ─── ToolResult ──────────────────────────────────────────────────────────────

/// Outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub caller_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
    pub execution_time_ms: u64,
}

impl ToolResult {
    pub fn success(ctx: &CallContext, value: serde_json::Value) -> Self {
        Self {
            call_id: ctx.call_id.clone(),
            tool_name: ctx.tool_name.clone(),
            caller_id: ctx.caller_id.clone(),
            success: true,
            value: Some(value),
            error: None,
            error_kind: None,
            execution_time_ms: ctx.elapsed_ms(),
        }
    }

    pub fn failure(ctx: &CallContext, kind: ToolErrorKind, error: impl Into<String>) -> Self {
        Self {
            call_id: ctx.call_id.clone(),
            tool_name: ctx.tool_name.clone(),
            caller_id: ctx.caller_id.clone(),
            success: false,
            value: None,
            error: Some(error.into()),
            error_kind: Some(kind),
            execution_time_ms: ctx.elapsed_ms(),
        }
    }

    /// Normalize a `tools/call` result payload.
    ///
    /// `isError: true` is a tool-level failure; its message comes from
    /// `content[0].text`.
    pub fn from_payload(ctx: &CallContext, payload: serde_json::Value) -> Self {
        if payload.get("isError").and_then(|v| v.as_bool()) == Some(true) {
            let message = payload
                .pointer("/content/0/text")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .unwrap_or(UNSPECIFIED_TOOL_ERROR);
            return Self::failure(ctx, ToolErrorKind::ExecutionFailed, message);
        }
        Self::success(ctx, payload)
    }

    pub fn is_retryable(&self) -> bool {
        self.error_kind.is_some_and(ToolErrorKind::is_retryable)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
