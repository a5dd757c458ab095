//! Task queue subcommands.

use std::time::Duration;

use anyhow::Result;
use clap::Subcommand;
use tokio::sync::watch;

use super::{print_scan, spawn_signal_handler};
use crate::config::ResolvedConfig;
use crate::tasks::Dispatcher;

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Scan the queue once and dispatch every pending task
    Run,

    /// Scan the queue repeatedly until Ctrl-C
    Watch {
        /// Seconds between scans
        #[arg(short, long, default_value = "30")]
        interval: u64,
    },

    /// Create the tasks, logs and archive directories
    Setup,

    /// List registered agents
    Agents,
}

pub async fn execute(config: &ResolvedConfig, command: TaskCommands) -> Result<()> {
    match command {
        TaskCommands::Run => {
            let report = Dispatcher::from_config(config)?.process_tasks().await?;
            print_scan(&report);
            Ok(())
        }
        TaskCommands::Watch { interval } => {
            let dispatcher = Dispatcher::from_config(config)?;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            spawn_signal_handler(shutdown_tx);

            let summary = dispatcher
                .poll(Duration::from_secs(interval.max(1)), shutdown_rx)
                .await;
            eprintln!(
                "\n[{} scan(s): {} archived, {} need inspection, {} to retry]",
                summary.scans, summary.archived, summary.left_for_inspection, summary.retry
            );
            Ok(())
        }
        TaskCommands::Setup => {
            config.paths.ensure().await?;
            println!("Tasks:   {}", config.paths.tasks.display());
            println!("Archive: {}", config.paths.archive.display());
            println!("Logs:    {}", config.paths.logs.display());
            Ok(())
        }
        TaskCommands::Agents => {
            println!("{:<20} {:<8} {}", "AGENT", "FOUND", "COMMAND");
            println!("{}", "-".repeat(80));
            for (name, spec) in config.agents.iter() {
                let found = if spec.path.is_file() { "yes" } else { "no" };
                println!("{:<20} {:<8} {}", name, found, spec.command_line());
            }
            Ok(())
        }
    }
}
