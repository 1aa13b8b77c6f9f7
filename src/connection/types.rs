//! Shared types for tool-server connections.
//!
//! JSON-RPC 2.0 envelope types and the tool catalog entry handed upstream.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// Method used to discover a server's tools.
pub const METHOD_TOOLS_LIST: &str = "tools/list";

/// Method used to invoke a tool.
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    /// Absent on server-initiated notifications.
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Internal JSON-RPC error code, used when a reply has neither field.
pub const INTERNAL_ERROR: i64 = -32603;

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// A tool as exposed to the chat loop.
///
/// `input_schema` is passed through from the server unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Description used when the server gives none, or for degraded entries.
    pub const GENERIC_DESCRIPTION: &'static str = "Tool provided by an external tool server";

    /// A catalog entry known only by name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: Self::GENERIC_DESCRIPTION.to_string(),
            input_schema: serde_json::json!({}),
        }
    }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle state of a server connection.
///
/// `Initializing` moves to `Ready` (discovery finished, possibly degraded)
/// or `Error` (transport setup failed). `Ready` moves to `Closed` on
/// teardown, or when a tool-server process exits on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Initializing,
    Ready,
    Error,
    Closed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Initializing => "initializing",
            ConnectionStatus::Ready => "ready",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, METHOD_TOOLS_LIST, None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"tools/list\""));
        // params should be omitted when None
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_json_rpc_request_with_params() {
        let params = serde_json::json!({"name": "lookup", "arguments": {"room": "204"}});
        let req = JsonRpcRequest::new(42, METHOD_TOOLS_CALL, Some(params));
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"id\":42"));
        assert!(json.contains("tools/call"));
        assert!(json.contains("204"));
    }

    #[test]
    fn test_json_rpc_error_response() {
        let json = r#"{
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32601, "message": "Method not found"}
        }"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.id, Some(2));
        assert!(resp.result.is_none());
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[test]
    fn test_notification_has_no_id() {
        let json = r#"{"jsonrpc": "2.0", "method": "notifications/progress", "params": {}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert!(resp.id.is_none());
    }

    #[test]
    fn test_tool_definition_wire_names() {
        let json = serde_json::to_value(ToolDefinition::named("echo")).unwrap();
        assert_eq!(json["inputSchema"], serde_json::json!({}));
        assert_eq!(json["description"], ToolDefinition::GENERIC_DESCRIPTION);
    }
}
