use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigError;

/// Default filter when neither `RUST_LOG` nor an explicit level is given.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Installs a formatted subscriber filtered by `level` (an `EnvFilter`
/// directive such as `keel=debug`).
pub fn init_logging(level: &str) -> Result<(), ConfigError> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| ConfigError::Logging(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| ConfigError::Logging("logging already initialized".into()))
}

/// Picks the filter: an explicit directive, then `RUST_LOG`, then
/// [`DEFAULT_LOG_FILTER`].
pub fn resolve_filter(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_owned)
        .or_else(|| {
            std::env::var("RUST_LOG")
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned())
}
