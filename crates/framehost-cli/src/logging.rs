//! Subscriber construction.

use std::fs::File;
use std::sync::Mutex;

use anyhow::Context as _;
use framehost_core::{LogConfig, LogHandlerLayer};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Logging for one-shot commands: warnings to stderr, debug with `--verbose`.
pub fn init_cli(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Logging for an attached host: configured level, optional log file
/// (truncated), optional console, and the host's handler layer.
pub fn init_host(config: &LogConfig, verbose: bool, handlers: LogHandlerLayer) -> anyhow::Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config.level()?.to_tracing()
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let file = match &config.file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let console = config.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .with(handlers)
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(())
}
