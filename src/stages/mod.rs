//! Stage interfaces for the in-process pipeline.
//!
//! A pipeline is one source, any number of transforms and one sink. Each
//! concrete agent implements exactly one of these roles, so the runner can
//! hold them as trait objects and swap any of them independently.

pub mod compliance;
pub mod normalization;
pub mod outreach;
pub mod scraper;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Batch;

pub use compliance::ComplianceStage;
pub use normalization::NormalizationStage;
pub use outreach::OutreachStage;
pub use scraper::ScraperStage;

/// Failure raised by a stage while processing a batch
#[derive(Debug, Error)]
pub enum StageError {
    #[error("record {record} is missing field '{field}'")]
    MissingField { record: String, field: String },

    #[error("record {record} has invalid '{field}': {reason}")]
    InvalidField {
        record: String,
        field: String,
        reason: String,
    },

    #[error("stage emitted record with unknown or altered id {id}")]
    IdentityViolation { id: String },

    #[error("{0}")]
    Failed(String),
}

/// First stage of a pipeline: produces a batch from nothing
#[async_trait]
pub trait Source: Send + Sync {
    /// Human-readable stage name
    fn name(&self) -> &str;

    async fn collect(&self) -> Result<Batch, StageError>;
}

/// Middle stage: turns one batch into another
#[async_trait]
pub trait Transform: Send + Sync {
    /// Human-readable stage name
    fn name(&self) -> &str;

    async fn process(&self, batch: Batch) -> Result<Batch, StageError>;
}

/// Final stage: consumes a batch and produces nothing further
#[async_trait]
pub trait Sink: Send + Sync {
    /// Human-readable stage name
    fn name(&self) -> &str;

    async fn consume(&self, batch: Batch) -> Result<(), StageError>;
}

/// Render a record id for error messages
pub(crate) fn describe_id(record: &crate::domain::Record) -> String {
    record
        .id()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "<no id>".to_string())
}
