//! Logging setup for parley.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::{ParleyError, Result};

/// Map a level name to a tracing level. Unknown names mean `info`.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(parse_level(level).into())
}

/// Install the global subscriber described by `config`.
///
/// Logs go to stdout and, when `config.file` is set, are appended to that
/// file as well.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = filter_for(&config.level);

    let Some(file) = config.file.as_deref().filter(|f| !f.is_empty()) else {
        return tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .with(filter)
            .try_init()
            .map_err(|e| ParleyError::Config(format!("logging: {e}")));
    };

    if let Some(parent) = Path::new(file).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let log_file = Arc::new(OpenOptions::new().create(true).append(true).open(file)?);
    let writer = std::io::stdout.and(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .with(filter)
        .try_init()
        .map_err(|e| ParleyError::Config(format!("logging: {e}")))
}

/// Console-only logging, used before the config is readable.
pub fn init_console_only(level: &str) {
    // A subscriber may already be installed, e.g. by a test harness.
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(true),
        )
        .with(filter_for(level))
        .try_init();
}
