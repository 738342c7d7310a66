//! Structured logging for vidwatch.
//!
//! Wraps `tracing` to provide a console layer plus JSON-formatted rolling
//! file output (NDJSON), with environment-based level control.

use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global logger.
///
/// Console output goes to stdout; NDJSON is written to
/// `<log_dir>/vidwatch.log.YYYY-MM-DD`. The filter comes from `RUST_LOG` when
/// set, otherwise `level`; the `debug` flag forces the default down to
/// `debug` (the session config's debug-mode switch). Safe to call more than
/// once.
pub fn init_logger<P: AsRef<Path>>(log_dir: P, level: &str, debug: bool) {
    let default_level = if debug { "debug" } else { level };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "vidwatch.log");

    let file_layer = fmt::layer()
        .json()
        .with_writer(file_appender)
        .with_ansi(false);

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_ansi(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}
