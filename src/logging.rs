//! Tracing setup for applications hosting the orchestrator.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! host's call. This helper mirrors the default the orchestrator is tuned
//! for: `EnvFilter` from `RUST_LOG`, falling back to info for this crate.

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "tool_orchestrator=info,warn";

/// Install a global `fmt` subscriber.
///
/// With `json = true` events are written as one JSON object per line, which
/// is what log shippers expect. Returns `false` if a global subscriber was
/// already installed (calling this twice is harmless).
pub fn init_tracing(json: bool) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = if json {
        fmt::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    } else {
        fmt::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            json,
            "tool orchestrator logging initialized"
        );
    }
    installed
}
