//! Logging initialization for the binary
//!
//! `RUST_LOG` takes precedence; otherwise the level comes from the command
//! line, then from `logging.level` in the configuration file.

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Normalize a level name, accepting `warning` for `warn`
pub fn parse_level(level: &str) -> Result<&'static str> {
    let level = level.trim().to_lowercase();
    let level = if level == "warning" { "warn".to_string() } else { level };
    LEVELS
        .iter()
        .find(|l| **l == level)
        .copied()
        .ok_or_else(|| anyhow!("Invalid log level: {level}"))
}

/// Build the filter used by [`init_logging`]
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = parse_level(level)?;
    EnvFilter::try_new(level).with_context(|| format!("Cannot build log filter for '{level}'"))
}

/// Install a stderr subscriber; a second call is a no-op
pub fn init_logging(level: &str) -> Result<()> {
    let filter = env_filter(level)?;
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
    Ok(())
}
