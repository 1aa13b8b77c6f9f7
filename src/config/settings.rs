//! Orchestrator tuning knobs.
//!
//! Defaults match what the chat loop expects: 30s per tool call, discovery
//! bounded at 10s (HTTP) and 5s (process), idle pools reclaimed after 30
//! minutes, checked every minute.

use std::time::Duration;

use serde::Deserialize;

// ─── Defaults ────────────────────────────────────────────────────────────────

const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_HTTP_DISCOVERY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PROCESS_DISCOVERY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_IDLE_THRESHOLD_MS: u64 = 30 * 60 * 1000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

/// Upper bound on buffered, not-yet-parseable output from a tool server.
const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Environment overrides read by [`OrchestratorSettings::from_env`].
pub const CALL_TIMEOUT_ENV: &str = "TOOL_ORCHESTRATOR_CALL_TIMEOUT_MS";
pub const IDLE_SECS_ENV: &str = "TOOL_ORCHESTRATOR_IDLE_SECS";
pub const SWEEP_SECS_ENV: &str = "TOOL_ORCHESTRATOR_SWEEP_SECS";

/// Timeouts and limits for the orchestrator and its transports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Default bound on one tool call, including waiting for the connection.
    pub call_timeout_ms: u64,
    pub http_discovery_timeout_ms: u64,
    pub process_discovery_timeout_ms: u64,
    /// Pools unused for longer than this are closed by the sweeper.
    pub idle_threshold_ms: u64,
    pub sweep_interval_ms: u64,
    /// TCP connect timeout for HTTP tool servers.
    pub connect_timeout_ms: u64,
    /// How long a killed tool-server process gets to be reaped.
    pub shutdown_grace_ms: u64,
    pub max_frame_bytes: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            http_discovery_timeout_ms: DEFAULT_HTTP_DISCOVERY_TIMEOUT_MS,
            process_discovery_timeout_ms: DEFAULT_PROCESS_DISCOVERY_TIMEOUT_MS,
            idle_threshold_ms: DEFAULT_IDLE_THRESHOLD_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl OrchestratorSettings {
    /// Defaults with overrides from the process environment.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup. Unparsable values are
    /// logged and ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_override(&lookup, CALL_TIMEOUT_ENV) {
            self.call_timeout_ms = ms;
        }
        if let Some(secs) = parse_override(&lookup, IDLE_SECS_ENV) {
            self.idle_threshold_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = parse_override(&lookup, SWEEP_SECS_ENV) {
            self.sweep_interval_ms = secs.saturating_mul(1000);
        }
        self
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn http_discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.http_discovery_timeout_ms)
    }

    pub fn process_discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.process_discovery_timeout_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic.
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn parse_override<F>(lookup: &F, name: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(variable = name, value = %raw, error = %e, "ignoring invalid setting override");
            None
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
