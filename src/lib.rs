//! auction-operator - pipeline event loop and file-based task runner
//!
//! Two independent paths share this crate:
//!
//! - An in-process event loop that runs a fixed chain of stages
//!   (scrape, compliance, normalization, outreach) whenever a trigger
//!   event arrives. Runs are strictly sequential; a failing stage aborts
//!   only its own run.
//! - A file-based task queue where JSON descriptors name an external
//!   agent. Each descriptor is executed, logged and archived.
//!
//! # Modules
//!
//! - `core`: Pipeline runner, event loop, interval scheduler
//! - `stages`: Stage traits and the built-in auction stages
//! - `tasks`: Queue scan, agent registry, executor, log sink, archiver
//! - `domain`: Data structures (Record, TriggerEvent, TaskDescriptor, RunReport)
//! - `config`: `.operator/config.yaml` loading and path resolution
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the event loop, scraping every 5 minutes
//! auction-operator run --now
//!
//! # Run the pipeline once
//! auction-operator pipeline
//!
//! # Dispatch every queued task descriptor
//! auction-operator tasks run
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod stages;
pub mod tasks;

// Re-export main types at crate root for convenience
pub use config::ResolvedConfig;
pub use core::{default_pipeline, CoalescePolicy, EventLoop, IntervalTrigger, Pipeline, TriggerSender};
pub use domain::{Record, RunOutcome, RunReport, TaskDescriptor, TriggerEvent};
pub use stages::{Sink, Source, StageError, Transform};
pub use tasks::{Dispatcher, ScanReport, TaskError, TaskOutcome};
