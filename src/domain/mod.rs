//! Domain types for the operator.
//!
//! This module contains the core data structures:
//! - Record / Batch: data flowing between pipeline stages
//! - TriggerEvent: requests consumed by the event loop
//! - TaskDescriptor: work items dropped into the task queue
//! - RunReport: outcome of a single pipeline run

pub mod record;
pub mod run;
pub mod task;
pub mod trigger;

// Re-export commonly used types
pub use record::{Batch, Record, ID_FIELD};
pub use run::{RunOutcome, RunReport};
pub use task::{TaskDescriptor, TaskState};
pub use trigger::{TriggerEvent, SCRAPE};
