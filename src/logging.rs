//! tracing subscriber setup
//!
//! The default filter keeps third-party crates at `warn`, runs this crate
//! at the configured `log_level` and gives sqlx its own level so every
//! statement of a transfer can be traced on demand (`sql_log_level: debug`).
//! `RUST_LOG` replaces the whole filter when set.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;

/// Filter used when `RUST_LOG` is not set
pub fn default_directives(config: &AppConfig) -> String {
    format!(
        "warn,{}={},sqlx={}",
        env!("CARGO_CRATE_NAME"),
        config.log_level,
        config.sql_log_level
    )
}

fn rotation(name: &str) -> Rotation {
    match name {
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender =
        RollingFileAppender::new(rotation(&config.rotation), &config.log_dir, &config.log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        // Machine-readable: transfer_id / account_id fields land as JSON keys
        let file_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().compact().with_target(false);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}
