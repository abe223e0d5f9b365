//! Console + rotating file logging bootstrap.

use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize logging with a console layer plus a daily-rotated file under
/// `log_dir`. Uses the `RUST_LOG` env var if set, otherwise falls back to
/// the provided level.
///
/// Library crates log through the `log` facade; the subscriber's bridge
/// picks those records up.
pub fn init(log_level: &str, log_dir: &Path) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if let Err(err) = std::fs::create_dir_all(log_dir) {
        eprintln!(
            "Could not create log directory {}: {}",
            log_dir.display(),
            err
        );
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "promosync.log");

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false),
        )
        .init();
}
