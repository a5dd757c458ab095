//! Command-line interface for the operator.
//!
//! Provides commands for running the timer-driven event loop, running a
//! pipeline once, processing the task queue and inspecting configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::core::{default_pipeline, CoalescePolicy, EventLoop, IntervalTrigger};
use crate::domain::{RunOutcome, TriggerEvent};
use crate::tasks::{ScanReport, TaskOutcome};

pub mod tasks;

/// auction-operator - pipeline event loop and file-based task runner
#[derive(Parser, Debug)]
#[command(name = "auction-operator")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to .operator/config.yaml in this or a parent directory)
    #[arg(long, global = true, env = "OPERATOR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the event loop with the interval trigger (blocks until Ctrl-C)
    Run {
        /// Seconds between scheduled runs (default from config: 300)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Also run immediately on start
        #[arg(long)]
        now: bool,

        /// Drop a scheduled trigger while an identical one is still queued
        #[arg(long)]
        coalesce: bool,
    },

    /// Run one pipeline to completion and print its report
    Pipeline {
        /// Trigger tag
        #[arg(default_value = "scrape")]
        tag: String,
    },

    /// Process the file-based task queue
    Tasks {
        #[command(subcommand)]
        command: tasks::TaskCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => ResolvedConfig::load_from(path)?,
            None => ResolvedConfig::load()?,
        };

        match self.command {
            Commands::Run {
                interval,
                now,
                coalesce,
            } => run_event_loop(&config, interval, now, coalesce).await,
            Commands::Pipeline { tag } => run_pipeline_once(&config, &tag).await,
            Commands::Tasks { command } => tasks::execute(&config, command).await,
            Commands::Config => show_config(&config),
        }
    }
}

/// First Ctrl-C requests a graceful stop; a second one exits immediately
pub(crate) fn spawn_signal_handler(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, finishing current work (Ctrl-C again to exit now)");
        let _ = shutdown.send(true);

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Exiting immediately");
            std::process::exit(130);
        }
    });
}

/// Run the event loop until interrupted
async fn run_event_loop(
    config: &ResolvedConfig,
    interval: Option<u64>,
    now: bool,
    coalesce: bool,
) -> Result<()> {
    let settings = &config.scheduler;
    let period = interval
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
        .unwrap_or(settings.interval);
    let policy = if coalesce {
        CoalescePolicy::Coalesce
    } else {
        settings.coalesce
    };

    let (event_loop, sender) = EventLoop::new(policy);
    let event_loop = event_loop.register(settings.tag.clone(), default_pipeline());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx);

    let timer = IntervalTrigger::new(settings.tag.clone(), period)
        .run_on_start(now || settings.run_on_start)
        .spawn(sender, shutdown_rx.clone());

    info!(tag = %settings.tag, ?policy, "Operator started");
    let stats = event_loop.run(shutdown_rx).await;

    let fired = timer.await.context("Interval trigger task failed")?;
    eprintln!(
        "\n[Stopped after {} run(s): {} completed, {} failed; {} trigger(s) fired]",
        stats.runs(),
        stats.completed,
        stats.failed,
        fired
    );
    Ok(())
}

/// Run a single triggered pipeline through the event loop
async fn run_pipeline_once(config: &ResolvedConfig, tag: &str) -> Result<()> {
    let (event_loop, sender) = EventLoop::new(CoalescePolicy::Queue);
    let mut event_loop = event_loop.register(config.scheduler.tag.clone(), default_pipeline());
    let mut reports = event_loop.subscribe();

    sender.send(TriggerEvent::new(tag))?;
    drop(sender);

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let stats = event_loop.run(shutdown_rx).await;

    if stats.ignored > 0 {
        anyhow::bail!("No pipeline registered for trigger '{}'", tag);
    }

    let report = reports
        .try_recv()
        .context("Event loop stopped without reporting a run")?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    match &report.outcome {
        RunOutcome::Completed { records } => {
            eprintln!(
                "\n[Run {} completed in {}ms: {} record(s) delivered]",
                report.run_id,
                report.duration_ms(),
                records
            );
            Ok(())
        }
        RunOutcome::Failed { stage, error } => {
            anyhow::bail!("Run {} failed in stage '{}': {}", report.run_id, stage, error)
        }
    }
}

/// Print one line per processed descriptor
pub(crate) fn print_scan(report: &ScanReport) {
    if report.locked_out {
        println!("Task queue is locked by another process; nothing done");
        return;
    }
    if report.is_empty() {
        println!("No pending tasks");
        return;
    }

    println!("{:<32} {:<20} {}", "TASK", "STATE", "DETAIL");
    println!("{}", "-".repeat(80));
    for task in &report.tasks {
        let (state, detail) = match &task.outcome {
            TaskOutcome::Archived {
                log_path,
                exit_code,
                ..
            } => (
                "archived",
                format!(
                    "log {} (exit {})",
                    log_path.display(),
                    exit_code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into())
                ),
            ),
            TaskOutcome::LeftForInspection(e) => ("needs-inspection", e.to_string()),
            TaskOutcome::Retry(e) => ("retry", e.to_string()),
        };
        println!("{:<32} {:<20} {}", task.name(), state, detail);
    }
}

/// Show resolved configuration
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("Auction Operator Configuration");
    println!("{}", "=".repeat(40));
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Root:     {}", cfg.root.display());
    println!("  Tasks:    {}", cfg.paths.tasks.display());
    println!("  Archive:  {}", cfg.paths.archive.display());
    println!("  Logs:     {}", cfg.paths.logs.display());
    println!("  Pattern:  {}", cfg.task_pattern);
    println!();
    println!("Scheduler:");
    println!("  Tag:          {}", cfg.scheduler.tag);
    println!("  Interval:     {}s", cfg.scheduler.interval.as_secs());
    println!("  Run on start: {}", cfg.scheduler.run_on_start);
    println!("  Duplicates:   {:?}", cfg.scheduler.coalesce);
    println!();
    println!("Executor:");
    println!("  Runtime:      {}", cfg.executor.runtime);
    println!(
        "  Timeout:      {}",
        cfg.executor
            .timeout
            .map(|t| format!("{}s", t.as_secs()))
            .unwrap_or_else(|| "none".to_string())
    );
    println!("  Max parallel: {}", cfg.executor.max_parallel);
    println!();
    println!("Agents: {}", cfg.agents.len());

    Ok(())
}
