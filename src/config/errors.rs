//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading a role's configuration.
///
/// These are the only failures the orchestrator lets propagate: a broken
/// role file is a deployment problem, not a runtime condition.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// No configuration exists for the role.
    #[error("no configuration for role '{role}' in {location}")]
    NotFound { role: String, location: String },

    /// The role name cannot be used as a configuration key.
    #[error("invalid role name '{role}': only letters, digits, '-' and '_' are allowed")]
    InvalidRole { role: String },

    /// The configuration file exists but could not be read.
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    /// The document is not valid JSON/YAML or does not match the schema.
    #[error("failed to parse configuration for role '{role}': {reason}")]
    Parse { role: String, reason: String },

    /// The document parsed but violates a constraint (e.g. duplicate names).
    #[error("invalid configuration for role '{role}': {reason}")]
    Invalid { role: String, reason: String },
}
