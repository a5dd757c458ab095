//! Core coordination logic for the in-process path.
//!
//! This module contains:
//! - Pipeline: ordered stage chains and their runner
//! - EventLoop: single-consumer loop serializing pipeline runs
//! - Scheduler: interval trigger feeding the loop

pub mod event_loop;
pub mod pipeline;
pub mod scheduler;

use tokio::sync::watch;

// Re-export commonly used types
pub use event_loop::{
    CoalescePolicy, EnqueueResult, EventLoop, LoopClosed, LoopStats, TriggerSender,
};
pub use pipeline::{default_pipeline, Pipeline, PipelineBuilder, PipelineFailure};
pub use scheduler::IntervalTrigger;

/// Resolve once shutdown has been signalled on `rx`.
///
/// If the signalling side is dropped without ever requesting shutdown, this
/// never resolves.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
