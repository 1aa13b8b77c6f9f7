//! Tool Orchestrator — role-scoped access to external tool servers.
//!
//! Submodules:
//! - `config`: Role configuration store, placeholder interpolation, settings
//! - `connection`: JSON-RPC transports (HTTP and spawned process), discovery
//! - `pool`: Server connections and per-role connection pools
//! - `orchestrator`: The façade used by the chat loop (list, access, execute)
//! - `result`: Tool call results and the error taxonomy surfaced upstream
//! - `errors`: Hard failures that do propagate (configuration, shutdown)
//! - `logging`: Tracing subscriber setup for hosting applications

pub mod config;
pub mod connection;
pub mod errors;
pub mod logging;
pub mod orchestrator;
pub mod pool;
pub mod result;

// Re-exports for convenience
pub use config::{
    FileConfigSource, MemoryConfigSource, OrchestratorSettings, RoleConfig, RoleConfigSource,
    RoleConfigStore, ServerDescriptor,
};
pub use connection::{Connection, ConnectionError, ConnectionFactory, ConnectionStatus, ToolDefinition};
pub use errors::OrchestratorError;
pub use orchestrator::ToolOrchestrator;
pub use pool::{ConnectionSnapshot, PoolSnapshot, RoleConnectionPool, ServerConnection};
pub use result::{ToolErrorKind, ToolResult};
