//! Server connections and per-role connection pools.
//!
//! A [`ServerConnection`] wraps one transport plus the catalog discovered
//! when it was built. A [`RoleConnectionPool`] holds one connection per
//! descriptor in the role's configuration, in configured order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::config::{RoleConfig, ServerDescriptor, TransportKind};
use crate::connection::{
    run_discovery, Catalog, Connection, ConnectionError, ConnectionFactory, ConnectionStatus,
    DiscoveryOutcome, ToolDefinition,
};

// ─── Call Failure ────────────────────────────────────────────────────────────

/// Why [`ServerConnection::call`] produced no payload.
#[derive(Debug)]
pub enum CallFailure {
    /// The connection was not `ready` when the call started.
    Unavailable(ConnectionStatus),
    /// The call (including the wait for the call slot) exceeded its budget.
    TimedOut(Duration),
    /// The transport or the server reported an error.
    Failed(ConnectionError),
}

// ─── ServerConnection ────────────────────────────────────────────────────────

#[derive(Debug)]
struct ConnectionState {
    status: ConnectionStatus,
    last_error: Option<String>,
    last_used: Instant,
}

/// One tool server as seen by a pool.
pub struct ServerConnection {
    descriptor: ServerDescriptor,
    /// `None` when transport setup failed.
    transport: Option<Box<dyn Connection>>,
    catalog: Catalog,
    state: Mutex<ConnectionState>,
    /// One outstanding call per connection.
    call_slot: tokio::sync::Mutex<()>,
}

impl ServerConnection {
    /// Build the transport and run discovery.
    ///
    /// Never fails: a transport that cannot be built leaves the connection
    /// in `error` with an empty catalog; failed discovery leaves it `ready`
    /// with the fallback catalog.
    pub async fn initialize(descriptor: ServerDescriptor, factory: &dyn ConnectionFactory) -> Self {
        tracing::debug!(
            server = %descriptor.name,
            transport = %descriptor.kind(),
            status = %ConnectionStatus::Initializing,
            "initializing server connection"
        );

        match factory.connect(&descriptor).await {
            Ok(transport) => {
                let catalog = run_discovery(&descriptor, transport.as_ref()).await;
                let last_error = match catalog.outcome() {
                    DiscoveryOutcome::Fallback { reason } => Some(reason.clone()),
                    DiscoveryOutcome::Discovered => None,
                };
                tracing::info!(
                    server = %descriptor.name,
                    transport = %descriptor.kind(),
                    tools = catalog.len(),
                    degraded = catalog.is_degraded(),
                    "server connection ready"
                );
                Self {
                    descriptor,
                    transport: Some(transport),
                    catalog,
                    state: Mutex::new(ConnectionState {
                        status: ConnectionStatus::Ready,
                        last_error,
                        last_used: Instant::now(),
                    }),
                    call_slot: tokio::sync::Mutex::new(()),
                }
            }
            Err(e) => {
                tracing::warn!(
                    server = %descriptor.name,
                    transport = %descriptor.kind(),
                    error = %e,
                    "server connection failed"
                );
                let reason = e.to_string();
                Self {
                    descriptor,
                    transport: None,
                    catalog: Catalog::empty(reason.clone()),
                    state: Mutex::new(ConnectionState {
                        status: ConnectionStatus::Error,
                        last_error: Some(reason),
                        last_used: Instant::now(),
                    }),
                    call_slot: tokio::sync::Mutex::new(()),
                }
            }
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> TransportKind {
        self.descriptor.kind()
    }

    /// Current status. A `ready` process connection whose child has exited
    /// is reported, and recorded, as `closed`.
    pub fn status(&self) -> ConnectionStatus {
        let mut state = self.state();
        if state.status == ConnectionStatus::Ready
            && self.transport.as_ref().is_some_and(|t| t.has_exited())
        {
            state.status = ConnectionStatus::Closed;
            state.last_error = Some("tool server process exited".into());
        }
        state.status
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ConnectionStatus::Ready
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn touch(&self) {
        self.state().last_used = Instant::now();
    }

    pub fn last_used(&self) -> Instant {
        self.state().last_used
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        self.catalog.tools()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.catalog.contains(name)
    }

    /// Per-server call timeout, if the descriptor sets one.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.descriptor.call_timeout()
    }

    /// Invoke a tool, waiting at most `timeout` for the call slot and the
    /// reply together.
    ///
    /// A timed-out call releases the slot; the connection stays usable.
    pub async fn call(
        &self,
        tool: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, CallFailure> {
        let status = self.status();
        let transport = match (&self.transport, status) {
            (Some(transport), ConnectionStatus::Ready) => transport,
            _ => return Err(CallFailure::Unavailable(status)),
        };

        let exchange = async {
            let _slot = self.call_slot.lock().await;
            tracing::debug!(server = %self.descriptor.name, tool, "dispatching tool call");
            transport.call(tool, arguments).await
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(payload)) => {
                self.touch();
                Ok(payload)
            }
            Ok(Err(e)) => {
                self.state().last_error = Some(e.to_string());
                Err(CallFailure::Failed(e))
            }
            Err(_) => Err(CallFailure::TimedOut(timeout)),
        }
    }

    /// Tear down the transport. Idempotent.
    pub async fn close(&self) {
        {
            let mut state = self.state();
            if state.status == ConnectionStatus::Ready {
                state.status = ConnectionStatus::Closed;
            }
        }
        if let Some(transport) = &self.transport {
            transport.close().await;
        }
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            name: self.descriptor.name.clone(),
            transport: self.kind(),
            status: self.status(),
            tools: self.catalog.names().map(str::to_string).collect(),
            degraded: self.catalog.is_degraded(),
            last_error: self.last_error(),
        }
    }
}

// ─── RoleConnectionPool ──────────────────────────────────────────────────────

/// The live connections for one role.
pub struct RoleConnectionPool {
    role: String,
    config: Arc<RoleConfig>,
    /// Same order as `config.servers`.
    connections: Vec<ServerConnection>,
    built_at: DateTime<Utc>,
    last_used: Mutex<Instant>,
    closed: AtomicBool,
}

impl RoleConnectionPool {
    /// Initialize every descriptor concurrently and wait for all of them.
    pub async fn build(config: Arc<RoleConfig>, factory: &dyn ConnectionFactory) -> Self {
        let started = Instant::now();
        let connections = join_all(
            config
                .servers
                .iter()
                .cloned()
                .map(|descriptor| ServerConnection::initialize(descriptor, factory)),
        )
        .await;

        warn_duplicate_tools(&config.role, &connections);

        let ready = connections.iter().filter(|c| c.is_ready()).count();
        tracing::info!(
            role = %config.role,
            servers = connections.len(),
            ready,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "role pool built"
        );

        Self {
            role: config.role.clone(),
            config,
            connections,
            built_at: Utc::now(),
            last_used: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn config(&self) -> &RoleConfig {
        &self.config
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn connections(&self) -> &[ServerConnection] {
        &self.connections
    }

    pub fn get(&self, server: &str) -> Option<&ServerConnection> {
        self.connections.iter().find(|c| c.name() == server)
    }

    /// First connection, in configured order, whose catalog has `tool`.
    pub fn route(&self, tool: &str) -> Option<&ServerConnection> {
        self.connections.iter().find(|c| c.has_tool(tool))
    }

    /// Concatenated catalogs of the `ready` connections.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.connections
            .iter()
            .filter(|c| c.is_ready())
            .flat_map(|c| c.tools().iter().cloned())
            .collect()
    }

    pub fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close every connection. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        join_all(self.connections.iter().map(|c| c.close())).await;
        tracing::info!(role = %self.role, servers = self.connections.len(), "role pool closed");
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            role: self.role.clone(),
            built_at: self.built_at,
            idle_for_secs: self.idle_for().as_secs(),
            servers: self.connections.iter().map(|c| c.snapshot()).collect(),
        }
    }
}

/// Log each tool name exposed by more than one server.
fn warn_duplicate_tools(role: &str, connections: &[ServerConnection]) {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for conn in connections {
        for tool in conn.catalog().names() {
            match owners.get(tool) {
                Some(first) => tracing::warn!(
                    role,
                    tool,
                    routed_to = *first,
                    shadowed = conn.name(),
                    "tool exposed by more than one server; first configured server wins"
                ),
                None => {
                    owners.insert(tool, conn.name());
                }
            }
        }
    }
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

/// Diagnostic view of one connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub name: String,
    pub transport: TransportKind,
    pub status: ConnectionStatus,
    pub tools: Vec<String>,
    pub degraded: bool,
    pub last_error: Option<String>,
}

/// Diagnostic view of one live pool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub role: String,
    pub built_at: DateTime<Utc>,
    pub idle_for_secs: u64,
    pub servers: Vec<ConnectionSnapshot>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
