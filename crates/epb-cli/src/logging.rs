//! Subscriber setup
//!
//! `RUST_LOG` wins; otherwise `--log-level`, then the configured
//! `log_level`, then `info`.

use std::path::Path;

use epb_core::BatchConfig;
use tracing_subscriber::EnvFilter;

/// Map a configured level name to a filter directive
pub(crate) fn filter_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

fn configured_level(config_path: &Path) -> Option<String> {
    BatchConfig::load(config_path).ok().map(|c| c.log_level)
}

/// Install the global fmt subscriber
pub(crate) fn init(cli_level: Option<&str>, config_path: &Path) {
    let level = cli_level
        .map(str::to_string)
        .or_else(|| configured_level(config_path));
    let directive = level.as_deref().map_or("info", filter_directive);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .with_target(false)
        .init();
}
