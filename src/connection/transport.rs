//! The connection capability shared by both transports.
//!
//! - [`Connection`]: `discover`, `call`, `close`
//! - [`ConnectionFactory`]: build a connection from a descriptor
//! - JSON-RPC helpers shared by the HTTP and process transports

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{OrchestratorSettings, ServerDescriptor, TransportConfig, TransportKind};

use super::errors::ConnectionError;
use super::http::HttpConnection;
use super::process::ProcessConnection;
use super::types::{JsonRpcResponse, INTERNAL_ERROR};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Connection ──────────────────────────────────────────────────────────────

/// A live link to one tool server.
///
/// Implementations do not enforce timeouts or serialise callers; the owning
/// `ServerConnection` does both.
#[async_trait]
pub trait Connection: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// How long discovery may take before falling back.
    fn discovery_timeout(&self) -> Duration;

    /// Send `tools/list` and return the raw `result.tools` entries.
    async fn discover(&self) -> Result<Vec<serde_json::Value>, ConnectionError>;

    /// Send `tools/call` and return the raw `result` payload.
    async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ConnectionError>;

    /// Whether the server went away on its own (process exit).
    fn has_exited(&self) -> bool {
        false
    }

    /// Release the transport. Must be idempotent.
    async fn close(&self);
}

/// Builds connections from descriptors.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
    ) -> Result<Box<dyn Connection>, ConnectionError>;
}

/// The production factory: HTTP client or spawned process per descriptor.
#[derive(Debug, Clone, Default)]
pub struct TransportFactory {
    settings: OrchestratorSettings,
}

impl TransportFactory {
    pub fn new(settings: OrchestratorSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ConnectionFactory for TransportFactory {
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        match &descriptor.transport {
            TransportConfig::Http(config) => {
                let conn = HttpConnection::connect(&descriptor.name, config, &self.settings)?;
                Ok(Box::new(conn))
            }
            TransportConfig::Process(config) => {
                let conn = ProcessConnection::spawn(&descriptor.name, config, &self.settings)?;
                Ok(Box::new(conn))
            }
        }
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors.
pub fn extract_result(
    server: &str,
    response: JsonRpcResponse,
) -> Result<serde_json::Value, ConnectionError> {
    if let Some(err) = response.error {
        return Err(ConnectionError::Rpc {
            server: server.to_string(),
            code: err.code,
            message: err.message,
        });
    }

    response.result.ok_or_else(|| ConnectionError::Rpc {
        server: server.to_string(),
        code: INTERNAL_ERROR,
        message: "response missing both result and error".into(),
    })
}

/// Pull the `tools` array out of a `tools/list` result.
pub fn tools_from_list_result(
    server: &str,
    mut result: serde_json::Value,
) -> Result<Vec<serde_json::Value>, ConnectionError> {
    match result.get_mut("tools").map(serde_json::Value::take) {
        Some(serde_json::Value::Array(tools)) => Ok(tools),
        _ => Err(ConnectionError::MalformedResponse {
            server: server.to_string(),
            reason: "tools/list result has no 'tools' array".into(),
        }),
    }
}

/// `tools/call` parameters.
pub fn tools_call_params(name: &str, arguments: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "arguments": arguments,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
