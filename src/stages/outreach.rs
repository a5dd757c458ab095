//! Outreach stage: sends notifications for processed listings.

use async_trait::async_trait;
use tracing::info;

use super::{describe_id, Sink, StageError};
use crate::domain::Batch;

/// Sink that notifies downstream parties about each listing.
///
/// Notification delivery is a log line per record.
#[derive(Debug, Default)]
pub struct OutreachStage;

impl OutreachStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sink for OutreachStage {
    fn name(&self) -> &str {
        "outreach"
    }

    async fn consume(&self, batch: Batch) -> Result<(), StageError> {
        info!(stage = self.name(), "Preparing outreach");
        for record in &batch {
            let title = record
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or_default();
            info!(id = %describe_id(record), title, "Notifying for item");
        }
        info!(stage = self.name(), notified = batch.len(), "Outreach complete");
        Ok(())
    }
}
