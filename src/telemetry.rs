//! Operator diagnostics on stderr via `tracing`.
//!
//! Filter comes from `RUST_LOG` (default `warn`). The diagnostic log files
//! in `logs` are separate and always written.
use std::env;

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

fn env_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "info" } else { "warn" };
    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string());
    EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the stderr subscriber once. Returns false when a global
/// subscriber was already set (by us or by an embedding test harness).
pub fn telemetry_init(verbose: bool) -> bool {
    if INIT.get().is_some() {
        return false;
    }
    let res = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if res.is_err() {
        eprintln!(
            "{}: telemetry init skipped (global subscriber already set)",
            env!("CARGO_PKG_NAME")
        );
        return false;
    }
    let _ = INIT.set(());
    true
}
