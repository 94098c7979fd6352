//! Logging initialization for the sync daemon.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging system.
///
/// Sets up tracing with:
/// - Log level from RUST_LOG env var or the provided default
/// - JSON output when `COURIER_SYNC_LOG_JSON` is set, human-readable otherwise
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(level).to_string()));

    let json = std::env::var("COURIER_SYNC_LOG_JSON")
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false);

    let result = if json {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .with_current_span(false)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };

    // Already-initialized is fine (tests init repeatedly).
    let _ = result;
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
