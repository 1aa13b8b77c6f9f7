//! Role configuration — which tool servers each role may reach.
//!
//! One file per role lists the role's tool servers in priority order. Files
//! are parsed once, interpolated against the environment, and cached until
//! [`RoleConfigStore::reload`] is called.

pub mod errors;
pub mod interpolate;
pub mod settings;
pub mod source;
pub mod store;
pub mod types;

pub use errors::ConfigError;
pub use settings::OrchestratorSettings;
pub use source::{default_config_dir, FileConfigSource, MemoryConfigSource, RoleConfigSource};
pub use store::RoleConfigStore;
pub use types::{
    AuthConfig, HttpTransportConfig, ProcessTransportConfig, RoleConfig, ServerDescriptor,
    TransportConfig, TransportKind,
};
