//! Logging integration for phinx-rs.
//!
//! Provides helpers for configuring [`tracing`]-based logging from a
//! [`Config`](crate::options::Config) and for creating per-migration spans.

use crate::options::Config;

/// Sets up the global tracing subscriber based on the given configuration.
///
/// The log level is read from `config.log_level` (e.g. "debug", "info", "warn").
/// When `config.debug` is set a pretty, human-readable format is used;
/// otherwise a structured JSON format is used. Installing a subscriber twice
/// is silently ignored.
pub fn setup_logging(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for a single migration run.
///
/// Every statement logged while the span is entered carries the migration's
/// version, name, and direction.
///
/// # Examples
///
/// ```
/// use phinx_rs_core::logging::migration_span;
///
/// let span = migration_span(20240101000000, "CreateUsers", "up");
/// let _guard = span.enter();
/// tracing::info!("migrating");
/// ```
pub fn migration_span(version: i64, name: &str, direction: &str) -> tracing::Span {
    tracing::info_span!("migration", version, name, direction)
}
