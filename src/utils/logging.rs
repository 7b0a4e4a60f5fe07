//! Tracing setup for the connector binary and for embedding applications.
//!
//! The configured `logging.level` is only the default: a `RUST_LOG` directive
//! in the environment takes precedence, so individual modules (for example
//! `popsub_connector::transport=trace`) can be turned up without a config
//! change.

use tracing_subscriber::EnvFilter;

/// Normalizes a configured level name. Unknown names fall back to `info`.
pub fn level_directive(level: &str) -> &'static str {
    match level.trim().to_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        "off" => "off",
        _ => "info",
    }
}

/// Filter from `RUST_LOG` when it is set and valid, otherwise from
/// `default_level`.
pub fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(default_level)))
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(default_level))
        .with_target(false)
        .try_init();
}
