//! Tracing subscriber setup.
//!
//! Diagnostics go to stderr through `tracing`; stdout is reserved for CLI
//! output so it can be piped. `RUST_LOG` takes precedence over the level
//! passed in.

use anyhow::{anyhow, Result};
use std::sync::OnceLock;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<()> {
    if LOGGER_INIT.get().is_some() {
        return Ok(());
    }

    let level: LevelFilter = level.into();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.to_string()))?
        .add_directive("sqlx=warn".parse()?)
        .add_directive("hyper_util=warn".parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;

    let _ = LOGGER_INIT.set(());
    Ok(())
}
