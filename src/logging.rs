// Logging setup
//
// env_logger reads RUST_LOG, falling back to `info`. With `log_to_file`
// set, records go to the configured file (after a short header) instead
// of stderr.

use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use std::fs::OpenOptions;
use std::io::Write;

use crate::config::DebugConfig;

pub const DEFAULT_FILTER: &str = "info";

/// Install the global logger
pub fn init(config: &DebugConfig) -> Result<()> {
    builder(Env::default().default_filter_or(DEFAULT_FILTER), config)?
        .try_init()
        .context("Failed to install logger")
}

fn builder(env: Env<'_>, config: &DebugConfig) -> Result<Builder> {
    let mut builder = Builder::from_env(env);

    if config.log_to_file {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.log_file)
            .with_context(|| format!("Failed to open log file {:?}", config.log_file))?;

        writeln!(file, "=== Render Context Log ===")?;
        writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
        writeln!(file)?;

        builder.target(Target::Pipe(Box::new(file)));
    }

    Ok(builder)
}
