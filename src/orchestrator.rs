//! The façade the chat loop talks to.
//!
//! Pools are built lazily per role. Concurrent requests for a role whose
//! pool is still being built wait on the same build instead of starting
//! their own, so a process server is never spawned twice for one pool.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::future::join_all;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{FileConfigSource, OrchestratorSettings, RoleConfigSource, RoleConfigStore};
use crate::connection::{ConnectionError, ConnectionFactory, ToolDefinition, TransportFactory};
use crate::errors::OrchestratorError;
use crate::pool::{CallFailure, PoolSnapshot, RoleConnectionPool};
use crate::result::{CallContext, ToolErrorKind, ToolResult};

/// A role's pool slot. Empty while the first build is in flight.
type PoolCell = Arc<OnceCell<Arc<RoleConnectionPool>>>;

struct Inner {
    settings: OrchestratorSettings,
    configs: RoleConfigStore,
    factory: Arc<dyn ConnectionFactory>,
    pools: Mutex<HashMap<String, PoolCell>>,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let sweeper = self.sweeper.get_mut().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = sweeper {
            handle.abort();
        }
    }
}

/// Role-scoped tool discovery, access control and routing.
///
/// Cheap to clone; clones share pools and configuration.
#[derive(Clone)]
pub struct ToolOrchestrator {
    inner: Arc<Inner>,
}

impl ToolOrchestrator {
    /// Orchestrator using the HTTP and process transports.
    pub fn new(settings: OrchestratorSettings, source: Arc<dyn RoleConfigSource>) -> Self {
        let factory = Arc::new(TransportFactory::new(settings.clone()));
        Self::with_factory(settings, source, factory)
    }

    pub fn with_factory(
        settings: OrchestratorSettings,
        source: Arc<dyn RoleConfigSource>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                configs: RoleConfigStore::new(source),
                factory,
                pools: Mutex::new(HashMap::new()),
                sweeper: std::sync::Mutex::new(None),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Role files from `dir`, settings from the environment.
    pub fn from_config_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(
            OrchestratorSettings::from_env(),
            Arc::new(FileConfigSource::new(dir)),
        )
    }

    /// Role files from the default directory, settings from the environment.
    pub fn from_env() -> Self {
        Self::new(
            OrchestratorSettings::from_env(),
            Arc::new(FileConfigSource::from_default_dir()),
        )
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    // ─── Pools ───────────────────────────────────────────────────────────

    /// Return the role's pool, building it on first use.
    ///
    /// A build that finishes after `reload_configs()` or `shutdown()` has
    /// discarded its slot is closed rather than handed out.
    pub async fn get_pool(&self, role: &str) -> Result<Arc<RoleConnectionPool>, OrchestratorError> {
        loop {
            if self.is_shut_down() {
                return Err(OrchestratorError::ShutDown);
            }

            // Unknown or invalid roles never get a slot in the map.
            let config = self.inner.configs.load(role)?;

            let cell = {
                let mut pools = self.inner.pools.lock().await;
                Arc::clone(pools.entry(role.to_string()).or_default())
            };

            let pool = cell
                .get_or_init(|| async {
                    Arc::new(RoleConnectionPool::build(config, self.inner.factory.as_ref()).await)
                })
                .await
                .clone();

            let current = {
                let pools = self.inner.pools.lock().await;
                pools.get(role).is_some_and(|c| Arc::ptr_eq(c, &cell))
            };
            if current && !self.is_shut_down() {
                return Ok(pool);
            }

            tracing::info!(role, "discarding pool built after reload or shutdown");
            pool.close().await;
        }
    }

    /// Remove every initialized pool from the live set and close them.
    async fn close_all(&self) -> usize {
        let drained: Vec<PoolCell> = {
            let mut pools = self.inner.pools.lock().await;
            pools.drain().map(|(_, cell)| cell).collect()
        };
        let live: Vec<Arc<RoleConnectionPool>> =
            drained.iter().filter_map(|cell| cell.get().cloned()).collect();
        join_all(live.iter().map(|pool| pool.close())).await;
        live.len()
    }

    /// Roles with a built pool, sorted.
    pub async fn live_roles(&self) -> Vec<String> {
        let pools = self.inner.pools.lock().await;
        let mut roles: Vec<String> = pools
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(role, _)| role.clone())
            .collect();
        roles.sort();
        roles
    }

    /// Diagnostic view of every built pool, sorted by role.
    pub async fn snapshot(&self) -> Vec<PoolSnapshot> {
        let live: Vec<Arc<RoleConnectionPool>> = {
            let pools = self.inner.pools.lock().await;
            pools.values().filter_map(|cell| cell.get().cloned()).collect()
        };
        let mut snapshots: Vec<PoolSnapshot> = live.iter().map(|p| p.snapshot()).collect();
        snapshots.sort_by(|a, b| a.role.cmp(&b.role));
        snapshots
    }

    // ─── Upstream API ────────────────────────────────────────────────────

    /// Tools currently available to `role`, from its `ready` connections.
    ///
    /// Only configuration errors and shutdown are reported as errors.
    pub async fn list_tools(&self, role: &str) -> Result<Vec<ToolDefinition>, OrchestratorError> {
        let pool = self.get_pool(role).await?;
        pool.touch();
        let tools = pool.list_tools();
        tracing::debug!(role, tools = tools.len(), "listed tools");
        Ok(tools)
    }

    /// Whether some server configured for `role` admits `tool`.
    ///
    /// Reads configuration only; no pool is built. Configuration errors
    /// count as "no".
    pub fn can_access(&self, role: &str, tool: &str) -> bool {
        match self.inner.configs.load(role) {
            Ok(config) => config.admits(tool),
            Err(e) => {
                tracing::debug!(role, tool, error = %e, "access check failed to load configuration");
                false
            }
        }
    }

    /// Run `tool` for `role` on behalf of `caller_id`.
    ///
    /// Never fails; every outcome is a [`ToolResult`].
    pub async fn execute(
        &self,
        role: &str,
        tool: &str,
        input: serde_json::Value,
        caller_id: &str,
    ) -> ToolResult {
        let ctx = CallContext::new(tool, caller_id);
        let result = self.execute_inner(&ctx, role, input).await;

        match result.error_kind {
            None => tracing::info!(
                call_id = %ctx.call_id,
                role,
                tool,
                caller = caller_id,
                elapsed_ms = result.execution_time_ms,
                "tool call succeeded"
            ),
            Some(kind) => tracing::warn!(
                call_id = %ctx.call_id,
                role,
                tool,
                caller = caller_id,
                kind = %kind,
                hint = kind.user_hint(),
                error = result.error.as_deref().unwrap_or_default(),
                elapsed_ms = result.execution_time_ms,
                "tool call failed"
            ),
        }
        result
    }

    async fn execute_inner(&self, ctx: &CallContext, role: &str, input: serde_json::Value) -> ToolResult {
        let tool = ctx.tool_name.as_str();

        if self.is_shut_down() {
            return ToolResult::failure(
                ctx,
                ToolErrorKind::ServerUnavailable,
                "tool orchestrator has been shut down",
            );
        }

        if !self.can_access(role, tool) {
            return ToolResult::failure(
                ctx,
                ToolErrorKind::AccessDenied,
                format!("role '{role}' is not permitted to use tool '{tool}'"),
            );
        }

        let pool = match self.get_pool(role).await {
            Ok(pool) => pool,
            Err(e) => return ToolResult::failure(ctx, ToolErrorKind::ServerUnavailable, e.to_string()),
        };

        let Some(conn) = pool.route(tool) else {
            return ToolResult::failure(
                ctx,
                ToolErrorKind::ToolNotFound,
                format!("no server available to role '{role}' provides tool '{tool}'"),
            );
        };

        let timeout = conn
            .call_timeout()
            .unwrap_or_else(|| self.inner.settings.call_timeout());

        match conn.call(tool, input, timeout).await {
            Ok(payload) => {
                pool.touch();
                ToolResult::from_payload(ctx, payload)
            }
            Err(CallFailure::Unavailable(status)) => ToolResult::failure(
                ctx,
                ToolErrorKind::ServerUnavailable,
                format!("server '{}' is {status}", conn.name()),
            ),
            Err(CallFailure::TimedOut(after)) => ToolResult::failure(
                ctx,
                ToolErrorKind::Timeout,
                format!("tool '{tool}' timed out after {}ms", after.as_millis()),
            ),
            Err(CallFailure::Failed(e @ ConnectionError::Closed { .. })) => {
                ToolResult::failure(ctx, ToolErrorKind::ServerUnavailable, e.to_string())
            }
            Err(CallFailure::Failed(e)) => {
                ToolResult::failure(ctx, ToolErrorKind::ExecutionFailed, e.to_string())
            }
        }
    }

    /// Drop cached configuration and close every pool. The next request for
    /// any role rebuilds from fresh configuration.
    pub async fn reload_configs(&self) {
        self.inner.configs.reload();
        let closed = self.close_all().await;
        tracing::info!(pools_closed = closed, "tool configuration reloaded");
    }

    /// Stop the idle sweeper and close every pool. Later calls are refused.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let sweeper = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = sweeper {
            handle.abort();
        }
        let closed = self.close_all().await;
        tracing::info!(pools_closed = closed, "tool orchestrator shut down");
    }

    // ─── Idle Reclamation ────────────────────────────────────────────────

    /// Close pools unused for longer than the idle threshold. Returns how
    /// many were closed.
    pub async fn sweep_idle(&self) -> usize {
        let threshold = self.inner.settings.idle_threshold();
        let idle: Vec<Arc<RoleConnectionPool>> = {
            let mut pools = self.inner.pools.lock().await;
            let roles: Vec<String> = pools
                .iter()
                .filter(|(_, cell)| cell.get().is_some_and(|p| p.idle_for() > threshold))
                .map(|(role, _)| role.clone())
                .collect();
            roles
                .iter()
                .filter_map(|role| pools.remove(role))
                .filter_map(|cell| cell.get().cloned())
                .collect()
        };

        for pool in &idle {
            tracing::info!(
                role = %pool.role(),
                idle_secs = pool.idle_for().as_secs(),
                "closing idle role pool"
            );
        }
        join_all(idle.iter().map(|pool| pool.close())).await;
        idle.len()
    }

    /// Run [`sweep_idle`](Self::sweep_idle) every sweep interval until
    /// shutdown. Calling it again while a sweeper runs does nothing.
    pub fn start_idle_sweeper(&self) {
        if self.is_shut_down() {
            return;
        }
        let mut slot = self.inner.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let interval = self.inner.settings.sweep_interval();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let orchestrator = ToolOrchestrator { inner };
                if orchestrator.is_shut_down() {
                    break;
                }
                let closed = orchestrator.sweep_idle().await;
                if closed > 0 {
                    tracing::debug!(closed, "idle sweep closed pools");
                }
            }
        }));
        tracing::debug!(interval_ms = interval.as_millis() as u64, "idle sweeper started");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
