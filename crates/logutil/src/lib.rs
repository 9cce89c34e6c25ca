//! Utilities for logging.
use tracing::subscriber;
use tracing::Level;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::SubscriberBuilder;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggingMode {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Map the number of `-v` flags to a default level.
pub fn verbosity_level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialize a global subscriber.
///
/// `RUST_LOG` takes precedence over the level derived from `verbosity`.
///
/// Panics if a global subscriber was already set.
pub fn init(verbosity: u8, mode: LoggingMode) {
    let level = verbosity_level(verbosity);
    let filter = env_filter(level);

    let builder = SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .with_thread_names(true);

    match mode {
        LoggingMode::Json => {
            let subscriber = builder.json().finish();
            subscriber::set_global_default(subscriber)
        }
        LoggingMode::Pretty => {
            let subscriber = builder.pretty().finish();
            subscriber::set_global_default(subscriber)
        }
        LoggingMode::Compact => {
            let subscriber = builder.compact().finish();
            subscriber::set_global_default(subscriber)
        }
    }
    .expect("failed to set global subscriber")
}

/// Initialize a subscriber for tests.
///
/// Safe to call from every test, only the first call installs the subscriber.
pub fn init_test() {
    let subscriber = SubscriberBuilder::default()
        .with_env_filter(env_filter(Level::DEBUG))
        .with_test_writer()
        .finish();
    let _ = subscriber::set_global_default(subscriber);
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy()
}
