use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};

use crate::config::Config;

/// Initialize logging for one toggle invocation
///
/// Disabled telemetry logs to stdout only; enabled telemetry appends to the
/// configured log file without ANSI escapes so the file stays grep-friendly.
pub fn init(enabled: bool, log_path: &str) -> Result<()> {
    if !enabled {
        tracing_subscriber::fmt().with_target(false).init();
        return Ok(());
    }

    let expanded_path = Config::expand_path(log_path)?;

    // Create parent directory if needed
    if let Some(parent) = expanded_path.parent() {
        fs::create_dir_all(parent).context("failed to create log directory")?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&expanded_path)
        .context("failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(file)
        .with_target(false)
        .with_ansi(false)
        .init();

    tracing::info!("telemetry initialized: {}", expanded_path.display());

    Ok(())
}
