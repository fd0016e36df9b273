//! Tracing subscriber setup
use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber. `RUST_LOG` takes precedence over `level`.
/// Later calls are no-ops once a global subscriber exists.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // already initialised by a previous call or by the host application
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
