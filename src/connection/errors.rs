//! Connection error types.

use thiserror::Error;

/// Errors raised while setting up or talking to a tool server.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The descriptor cannot produce a usable transport (empty command,
    /// malformed URL, ...).
    #[error("invalid descriptor for server '{server}': {reason}")]
    InvalidDescriptor { server: String, reason: String },

    /// The tool-server process failed to start.
    #[error("failed to spawn server '{server}': {reason}")]
    SpawnFailed { server: String, reason: String },

    /// The HTTP request itself failed (connect, TLS, body read).
    #[error("http error for server '{server}': {reason}")]
    Http { server: String, reason: String },

    /// The server answered with a non-2xx status.
    #[error("server '{server}' returned HTTP {status}: {body}")]
    HttpStatus {
        server: String,
        status: u16,
        body: String,
    },

    /// Pipe I/O failed.
    #[error("transport error for server '{server}': {reason}")]
    Transport { server: String, reason: String },

    /// The server replied with a JSON-RPC error object.
    #[error("server '{server}' error [{code}]: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },

    /// The reply was not a well-formed JSON-RPC response.
    #[error("malformed response from server '{server}': {reason}")]
    MalformedResponse { server: String, reason: String },

    /// Output grew past the framing limit without a complete message.
    #[error("server '{server}' sent {buffered} bytes without a complete message (limit {limit})")]
    FrameOverflow {
        server: String,
        buffered: usize,
        limit: usize,
    },

    /// The connection was closed, or the process exited.
    #[error("connection to server '{server}' is closed")]
    Closed { server: String },
}
