use anyhow::{Context, Result};
use tracing_subscriber::{
    fmt::{self, time::SystemTime},
    prelude::*,
    EnvFilter,
};

/// Installs the global subscriber. `RUST_LOG` wins over `quiet`; by default
/// only info and above is shown, or warnings and above when `quiet`.
/// Without `log_style` each line is just the message.
pub fn setup_logging(quiet: bool, log_style: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(quiet)));

    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    if log_style {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_level(true).with_timer(SystemTime));
        tracing::subscriber::set_global_default(subscriber)
            .context("Failed to set tracing subscriber")?;
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_level(false).without_time());
        tracing::subscriber::set_global_default(subscriber)
            .context("Failed to set tracing subscriber")?;
    }
    Ok(())
}

fn default_level(quiet: bool) -> &'static str {
    if quiet {
        "warn"
    } else {
        "info"
    }
}
