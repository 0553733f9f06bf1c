//! Utilities for logging.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

/// Environment variable checked for filter directives before falling back to
/// `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "FLOE_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    HumanReadable,
    Json,
}

fn env_filter(default_level: Level) -> EnvFilter {
    let builder = EnvFilter::builder().with_default_directive(default_level.into());
    if std::env::var(LOG_ENV_VAR).is_ok() {
        builder.with_env_var(LOG_ENV_VAR).from_env_lossy()
    } else {
        builder.from_env_lossy()
    }
}

fn subscriber_builder(default_level: Level) -> SubscriberBuilder<
    tracing_subscriber::fmt::format::DefaultFields,
    tracing_subscriber::fmt::format::Format,
    EnvFilter,
> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_file(true)
        .with_line_number(true)
}

/// Install the global tracing subscriber.
///
/// Filter directives from the environment take precedence over
/// `default_level`. Calling this more than once is a no-op.
pub fn configure_global_logger(format: LogFormat, default_level: Level) {
    let result = match format {
        LogFormat::HumanReadable => subscriber_builder(default_level).try_init(),
        LogFormat::Json => subscriber_builder(default_level).json().try_init(),
    };
    // Another subscriber may already be installed (tests, embedding apps).
    let _ = result;
}

/// Logger for tests, writing through the test harness capture.
pub fn init_test() {
    let _ = subscriber_builder(Level::DEBUG).with_test_writer().try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_fine() {
        init_test();
        init_test();
        configure_global_logger(LogFormat::Json, Level::INFO);
        tracing::debug!("logger configured");
    }
}
