//! Hard failures surfaced by the orchestrator.
//!
//! Tool calls never fail this way; see [`crate::result::ToolResult`].

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The role's configuration could not be loaded.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// `shutdown()` has been called.
    #[error("tool orchestrator has been shut down")]
    ShutDown,
}
