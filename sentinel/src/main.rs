mod cli;
mod config;
mod error;
mod event;
mod logging;
mod matcher;
mod notifier;
mod paths;
mod process;
mod process_monitor;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};

use crate::cli::Cli;
use crate::config::Config;
use crate::matcher::ProcessMatcher;
use crate::notifier::NotificationDispatcher;
use crate::process::SysinfoTable;
use crate::process_monitor::{LoopExit, MonitorSettings, ProcessMonitor};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::setup_logging(cli.quiet, cli.log) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // ── Configuration ─────────────────────────────────────────────────────────
    let file_config = match &cli.config {
        Some(path) => config::load(path)?,
        None => match paths::config_file_path() {
            Some(path) => config::load_or_default(&path)?,
            None => Config::default(),
        },
    };
    let config = file_config.apply_cli(&cli);
    config.validate().context("Invalid configuration")?;
    let criteria = config.match_criteria().context("Invalid command pattern")?;

    // ── Notification backends ─────────────────────────────────────────────────
    let notifiers = notifier::build_notifiers(&config).context("Failed to load notification backend")?;
    let dispatcher = NotificationDispatcher::new(notifiers, config.send_timeout());
    if dispatcher.backend_names().is_empty() {
        warn!("No notification backend selected; ended processes will only be logged");
    }

    // ── Initial watch set ─────────────────────────────────────────────────────
    let mut monitor = ProcessMonitor::new(
        SysinfoTable::new(),
        ProcessMatcher::new(criteria),
        dispatcher,
        MonitorSettings::from_config(&config),
    );
    monitor.initialize(&config.watch.pids);

    if monitor.is_empty() && !monitor.discovers_new() {
        warn!("No processes found to watch.");
        return Ok(ExitCode::FAILURE);
    }

    let watched: Vec<_> = monitor.watched().collect();
    info!("Watching {} process(es):", watched.len());
    for record in watched {
        info!("{}", record.describe());
    }
    if monitor.discovers_new() {
        info!("Watching for new matching processes");
    }

    // ── Poll loop ─────────────────────────────────────────────────────────────
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    match monitor.run(shutdown).await {
        LoopExit::Interrupted => {
            info!("Interrupted, shutting down");
            Ok(ExitCode::SUCCESS)
        }
        LoopExit::NothingToWatch => {
            warn!("No processes left to watch.");
            Ok(ExitCode::FAILURE)
        }
    }
}
