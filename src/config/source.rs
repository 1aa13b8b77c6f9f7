//! Where role configuration documents come from.
//!
//! Implementations:
//! - `FileConfigSource`: one file per role under a directory (JSON or YAML)
//! - `MemoryConfigSource`: in-memory documents, for embedding hosts and tests

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use super::errors::ConfigError;
use super::types::ServerDescriptor;

/// Environment variable that overrides the role configuration directory.
pub const CONFIG_DIR_ENV: &str = "TOOL_ORCHESTRATOR_CONFIG_DIR";

/// Extensions tried, in order, for a role file.
const ROLE_FILE_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Supplies the raw (not yet interpolated) descriptors for a role.
pub trait RoleConfigSource: Send + Sync {
    /// Read the ordered server list for `role`.
    fn read_role(&self, role: &str) -> Result<Vec<ServerDescriptor>, ConfigError>;

    /// Human-readable location, for log and error messages.
    fn location(&self) -> String;
}

/// Resolve the default role configuration directory.
///
/// 1. `TOOL_ORCHESTRATOR_CONFIG_DIR` if set
/// 2. `<platform config dir>/tool-orchestrator/roles`
/// 3. `./config/roles`
pub fn default_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::config_dir()
        .map(|d| d.join("tool-orchestrator").join("roles"))
        .unwrap_or_else(|| PathBuf::from("config").join("roles"))
}

/// Parse a role document that is either a bare descriptor array or an
/// object with a `servers` array.
pub fn parse_role_document(
    role: &str,
    document: serde_json::Value,
) -> Result<Vec<ServerDescriptor>, ConfigError> {
    let servers = match document {
        serde_json::Value::Array(_) => document,
        serde_json::Value::Object(mut map) => map.remove("servers").ok_or(ConfigError::Parse {
            role: role.to_string(),
            reason: "expected an array of servers or an object with a 'servers' array".into(),
        })?,
        _ => {
            return Err(ConfigError::Parse {
                role: role.to_string(),
                reason: "expected an array of servers or an object with a 'servers' array".into(),
            })
        }
    };

    serde_json::from_value(servers).map_err(|e| ConfigError::Parse {
        role: role.to_string(),
        reason: e.to_string(),
    })
}

// ─── FileConfigSource ────────────────────────────────────────────────────────

/// Reads `<dir>/<role>.json`, `<dir>/<role>.yaml` or `<dir>/<role>.yml`.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    dir: PathBuf,
}

impl FileConfigSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Source rooted at [`default_config_dir`].
    pub fn from_default_dir() -> Self {
        Self::new(default_config_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn find_role_file(&self, role: &str) -> Option<PathBuf> {
        ROLE_FILE_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{role}.{ext}")))
            .find(|p| p.is_file())
    }
}

impl RoleConfigSource for FileConfigSource {
    fn read_role(&self, role: &str) -> Result<Vec<ServerDescriptor>, ConfigError> {
        let path = self.find_role_file(role).ok_or_else(|| ConfigError::NotFound {
            role: role.to_string(),
            location: self.location(),
        })?;

        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let document: serde_json::Value = if is_json {
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
                role: role.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?
        } else {
            serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
                role: role.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?
        };

        tracing::debug!(role, path = %path.display(), "read role configuration file");
        parse_role_document(role, document)
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}

// ─── MemoryConfigSource ──────────────────────────────────────────────────────

/// In-memory role documents.
#[derive(Debug, Default)]
pub struct MemoryConfigSource {
    roles: RwLock<HashMap<String, Vec<ServerDescriptor>>>,
    reads: AtomicUsize,
}

impl MemoryConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`MemoryConfigSource::set_role`].
    pub fn with_role(self, role: &str, servers: Vec<ServerDescriptor>) -> Self {
        self.set_role(role, servers);
        self
    }

    /// Replace the document for `role`. Takes effect after the next reload.
    pub fn set_role(&self, role: &str, servers: Vec<ServerDescriptor>) {
        let mut roles = self.roles.write().unwrap_or_else(|e| e.into_inner());
        roles.insert(role.to_string(), servers);
    }

    /// How many times a role has been read (cache-miss counter).
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl RoleConfigSource for MemoryConfigSource {
    fn read_role(&self, role: &str) -> Result<Vec<ServerDescriptor>, ConfigError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let roles = self.roles.read().unwrap_or_else(|e| e.into_inner());
        roles.get(role).cloned().ok_or_else(|| ConfigError::NotFound {
            role: role.to_string(),
            location: self.location(),
        })
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
