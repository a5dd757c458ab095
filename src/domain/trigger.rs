//! Trigger events consumed by the event loop.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag of the collection pipeline fired by the timer
pub const SCRAPE: &str = "scrape";

/// A request to run the pipeline registered under `tag`.
///
/// Carries no payload; it is consumed exactly once by the event loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub tag: String,
}

impl TriggerEvent {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    /// The event fired by the recurring scrape schedule
    pub fn scrape() -> Self {
        Self::new(SCRAPE)
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}
