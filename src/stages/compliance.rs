//! Compliance stage: drops records that cannot be checked.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{StageError, Transform};
use crate::domain::Batch;

/// Transform that keeps only records meeting policy requirements.
///
/// The policy is a placeholder: a record passes when it has at least one field.
#[derive(Debug, Default)]
pub struct ComplianceStage;

impl ComplianceStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transform for ComplianceStage {
    fn name(&self) -> &str {
        "compliance"
    }

    async fn process(&self, batch: Batch) -> Result<Batch, StageError> {
        info!(stage = self.name(), "Checking compliance");
        let before = batch.len();
        let compliant: Batch = batch.into_iter().filter(|r| !r.is_empty()).collect();

        if compliant.len() != before {
            debug!(dropped = before - compliant.len(), "Dropped non-compliant records");
        }
        info!(stage = self.name(), records = compliant.len(), "Compliance check complete");
        Ok(compliant)
    }
}
