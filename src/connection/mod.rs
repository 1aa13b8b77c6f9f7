//! Connections to tool servers — JSON-RPC over HTTP or a child process.
//!
//! This module handles:
//! - The `Connection` capability both transports implement
//! - HTTP request/response and stdio pipe framing
//! - Tool discovery (`tools/list`) with allow/deny filtering and fallback
//!
//! Nothing outside [`transport::TransportFactory`] branches on transport kind.

pub mod discovery;
pub mod errors;
pub mod framer;
pub mod http;
pub mod process;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use discovery::{run_discovery, Catalog, DiscoveryOutcome};
pub use errors::ConnectionError;
pub use framer::JsonFramer;
pub use http::HttpConnection;
pub use process::ProcessConnection;
pub use transport::{Connection, ConnectionFactory, TransportFactory};
pub use types::{ConnectionStatus, ToolDefinition};
