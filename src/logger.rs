//! Logging setup shared by the client and the server binaries.
//!
//! Every module logs through the `log` macros; this installs a `fern`
//! dispatcher writing timestamped lines to stderr and, optionally, a file.

use anyhow::{Context, Result};
use chrono::Local;
use log::LevelFilter;

use crate::config::LoggingConfig;

/// Dependency targets capped at `warn` regardless of the configured level.
const NOISY_TARGETS: [&str; 4] = ["sqlx", "sea_orm", "hyper", "reqwest"];

/// Build the dispatcher for `config` without installing it.
pub fn dispatch(config: &LoggingConfig) -> Result<fern::Dispatch> {
    let level = config.level_filter()?;
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {:<5} {}] {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level);
    for target in NOISY_TARGETS {
        dispatch = dispatch.level_for(target, level.min(LevelFilter::Warn));
    }

    dispatch = dispatch.chain(std::io::stderr());
    if let Some(path) = &config.file {
        let file = fern::log_file(path).with_context(|| format!("Failed to open log file: {}", path.display()))?;
        dispatch = dispatch.chain(file);
    }
    Ok(dispatch)
}

/// Install the global logger.
pub fn init(config: &LoggingConfig) -> Result<()> {
    dispatch(config)?.apply().context("Logger already initialized")?;
    Ok(())
}
