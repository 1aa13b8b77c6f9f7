//! Role configuration types.
//!
//! The wire shape of a role file uses the field names the rest of the hotel
//! application writes (`type`, `tools`, `excludeTools`, ...); serde maps them
//! onto the Rust-side types here. Cross-field checks live in
//! [`RoleConfig::new`].

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::ConfigError;

// ─── Transport ───────────────────────────────────────────────────────────────

/// Which transport a tool server is reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Stateless JSON-RPC over HTTP POST.
    Http,
    /// JSON-RPC over the stdio pipes of a spawned child process.
    Process,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Http => f.write_str("http"),
            TransportKind::Process => f.write_str("process"),
        }
    }
}

/// Credentials attached to every HTTP request.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        #[serde(default)]
        password: String,
    },
}

// Secrets never reach the logs.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::None => f.write_str("None"),
            AuthConfig::Bearer { .. } => f.write_str("Bearer { token: <redacted> }"),
            AuthConfig::Basic { username, .. } => {
                write!(f, "Basic {{ username: {username:?}, password: <redacted> }}")
            }
        }
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    /// Base URL; requests go to `<url>/tools/list` and `<url>/tools/call`.
    pub url: String,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Spawned-process transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTransportConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Added on top of the orchestrator's own environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

/// Transport-specific half of a descriptor, selected by the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    Http(HttpTransportConfig),
    #[serde(rename = "stdio", alias = "process")]
    Process(ProcessTransportConfig),
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::Http(_) => TransportKind::Http,
            TransportConfig::Process(_) => TransportKind::Process,
        }
    }
}

// ─── Descriptor ──────────────────────────────────────────────────────────────

/// One tool server a role may reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub transport: TransportConfig,
    /// Allow list. Empty means every discovered tool is allowed.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Deny list, applied before the allow list.
    #[serde(default)]
    pub exclude_tools: Vec<String>,
    /// Per-server override of the tool call timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ServerDescriptor {
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Whether this server's filter admits `tool`.
    ///
    /// The deny list wins; an empty allow list admits everything else.
    pub fn admits(&self, tool: &str) -> bool {
        if self.exclude_tools.iter().any(|t| t == tool) {
            return false;
        }
        self.tools.is_empty() || self.tools.iter().any(|t| t == tool)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

// ─── RoleConfig ──────────────────────────────────────────────────────────────

/// The ordered list of tool servers configured for one role.
///
/// Order matters: when two servers expose the same tool name, the one
/// listed first handles the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleConfig {
    pub role: String,
    pub servers: Vec<ServerDescriptor>,
}

impl RoleConfig {
    /// Build a role configuration, rejecting blank or duplicate server names.
    pub fn new(role: &str, servers: Vec<ServerDescriptor>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for server in &servers {
            let name = server.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid {
                    role: role.to_string(),
                    reason: "server descriptor with an empty name".into(),
                });
            }
            if !seen.insert(name) {
                return Err(ConfigError::Invalid {
                    role: role.to_string(),
                    reason: format!("duplicate server name '{name}'"),
                });
            }
        }

        Ok(Self {
            role: role.to_string(),
            servers,
        })
    }

    /// Whether any server's filter admits `tool`.
    pub fn admits(&self, tool: &str) -> bool {
        self.servers.iter().any(|s| s.admits(tool))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
