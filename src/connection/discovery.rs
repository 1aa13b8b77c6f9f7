//! Tool discovery: `tools/list`, allow/deny filtering, fallback catalogs.

use std::collections::HashSet;

use crate::config::ServerDescriptor;

use super::transport::Connection;
use super::types::ToolDefinition;

/// How a catalog came to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// Built from the server's own `tools/list` reply.
    Discovered,
    /// Discovery failed; the catalog was synthesized from the allow list.
    Fallback { reason: String },
}

/// The tools one connection exposes, in server order, names unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    tools: Vec<ToolDefinition>,
    outcome: DiscoveryOutcome,
}

impl Catalog {
    /// Catalog for a connection that never got a transport.
    pub fn empty(reason: impl Into<String>) -> Self {
        Self {
            tools: Vec::new(),
            outcome: DiscoveryOutcome::Fallback {
                reason: reason.into(),
            },
        }
    }

    /// Filter a raw `tools/list` array through the descriptor's lists.
    ///
    /// Entries without a string `name` are skipped, as are repeats of a name
    /// already seen. Missing descriptions and schemas get defaults.
    pub fn from_listing(descriptor: &ServerDescriptor, raw: Vec<serde_json::Value>) -> Self {
        let mut seen = HashSet::new();
        let mut tools = Vec::new();

        for entry in raw {
            let Some(name) = entry.get("name").and_then(|v| v.as_str()) else {
                tracing::debug!(server = %descriptor.name, "skipping tool entry without a name");
                continue;
            };
            if !descriptor.admits(name) || !seen.insert(name.to_string()) {
                continue;
            }

            let description = entry
                .get("description")
                .and_then(|v| v.as_str())
                .filter(|d| !d.is_empty())
                .unwrap_or(ToolDefinition::GENERIC_DESCRIPTION)
                .to_string();
            let input_schema = entry
                .get("inputSchema")
                .filter(|s| !s.is_null())
                .cloned()
                .unwrap_or_else(|| serde_json::json!({}));

            tools.push(ToolDefinition {
                name: name.to_string(),
                description,
                input_schema,
            });
        }

        Self {
            tools,
            outcome: DiscoveryOutcome::Discovered,
        }
    }

    /// Degraded catalog: one generic entry per allow-listed, non-denied name.
    pub fn fallback(descriptor: &ServerDescriptor, reason: impl Into<String>) -> Self {
        let mut seen = HashSet::new();
        let tools = descriptor
            .tools
            .iter()
            .filter(|name| descriptor.admits(name) && seen.insert(name.as_str()))
            .map(|name| ToolDefinition::named(name))
            .collect();

        Self {
            tools,
            outcome: DiscoveryOutcome::Fallback {
                reason: reason.into(),
            },
        }
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn outcome(&self) -> &DiscoveryOutcome {
        &self.outcome
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, DiscoveryOutcome::Fallback { .. })
    }
}

/// Run discovery against a live connection.
///
/// Never fails: timeouts, transport errors, malformed replies and JSON-RPC
/// error replies all produce the fallback catalog.
pub async fn run_discovery(descriptor: &ServerDescriptor, conn: &dyn Connection) -> Catalog {
    let timeout = conn.discovery_timeout();
    let reason = match tokio::time::timeout(timeout, conn.discover()).await {
        Ok(Ok(raw)) => {
            let catalog = Catalog::from_listing(descriptor, raw);
            tracing::info!(
                server = %descriptor.name,
                transport = %conn.kind(),
                tools = catalog.len(),
                "tool discovery complete"
            );
            return catalog;
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("tools/list timed out after {}ms", timeout.as_millis()),
    };

    let catalog = Catalog::fallback(descriptor, reason.clone());
    tracing::warn!(
        server = %descriptor.name,
        transport = %conn.kind(),
        reason = %reason,
        fallback_tools = catalog.len(),
        "tool discovery failed, using allow list"
    );
    catalog
}

// ─── Tests ───────────────────────────────────────────────────────────────────
