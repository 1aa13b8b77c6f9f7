//! Role configuration store — loads, interpolates and caches role configs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::errors::ConfigError;
use super::interpolate::interpolate_descriptor;
use super::source::RoleConfigSource;
use super::types::RoleConfig;

/// Cache of interpolated role configurations, keyed by role name.
///
/// A role is read from its source once; later loads return the cached
/// `Arc`. Failed loads are not cached, so fixing a broken file takes effect
/// on the next request.
pub struct RoleConfigStore {
    source: Arc<dyn RoleConfigSource>,
    cache: RwLock<HashMap<String, Arc<RoleConfig>>>,
}

impl RoleConfigStore {
    pub fn new(source: Arc<dyn RoleConfigSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load the configuration for `role`, reading the source on a cache miss.
    pub fn load(&self, role: &str) -> Result<Arc<RoleConfig>, ConfigError> {
        validate_role_name(role)?;

        if let Some(config) = self.cached(role) {
            return Ok(config);
        }

        let raw = self.source.read_role(role)?;
        let servers = raw.iter().map(interpolate_descriptor).collect();
        let config = Arc::new(RoleConfig::new(role, servers)?);

        tracing::info!(
            role,
            servers = config.servers.len(),
            source = %self.source.location(),
            "loaded role configuration"
        );

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        // A concurrent load may have won the race; keep the first entry.
        let entry = cache.entry(role.to_string()).or_insert(config);
        Ok(Arc::clone(entry))
    }

    /// Drop every cached configuration.
    pub fn reload(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        let dropped = cache.len();
        cache.clear();
        tracing::info!(dropped, "role configuration cache cleared");
    }

    /// Roles currently cached, sorted.
    pub fn cached_roles(&self) -> Vec<String> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        let mut roles: Vec<String> = cache.keys().cloned().collect();
        roles.sort();
        roles
    }

    fn cached(&self, role: &str) -> Option<Arc<RoleConfig>> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.get(role).cloned()
    }
}

/// Role names become file names, so keep them to a safe alphabet.
fn validate_role_name(role: &str) -> Result<(), ConfigError> {
    let valid = !role.is_empty()
        && role
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidRole {
            role: role.to_string(),
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
