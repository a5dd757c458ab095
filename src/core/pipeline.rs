//! Pipeline definitions and sequential execution.
//!
//! A pipeline is an ordered chain of stages: one source, zero or more
//! transforms, one sink. Each stage's output batch is the next stage's input.
//! The first failing stage aborts the run; later stages are never invoked and
//! any batches produced so far are dropped.

use std::collections::HashSet;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::domain::Batch;
use crate::stages::{
    ComplianceStage, NormalizationStage, OutreachStage, ScraperStage, Sink, Source, StageError,
    Transform,
};

/// A run aborted because one of its stages failed
#[derive(Debug, Error)]
#[error("stage '{stage}' failed: {error}")]
pub struct PipelineFailure {
    /// Name of the failing stage
    pub stage: String,

    /// The stage's error
    #[source]
    pub error: StageError,
}

/// An ordered chain of stages
pub struct Pipeline {
    name: String,
    source: Box<dyn Source>,
    transforms: Vec<Box<dyn Transform>>,
    sink: Box<dyn Sink>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    /// Start building a pipeline from its source stage
    pub fn builder(name: impl Into<String>, source: impl Source + 'static) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            source: Box::new(source),
            transforms: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage names in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        std::iter::once(self.source.name())
            .chain(self.transforms.iter().map(|t| t.name()))
            .chain(std::iter::once(self.sink.name()))
            .collect()
    }

    /// Execute every stage in order.
    ///
    /// Returns the number of records handed to the sink.
    #[instrument(skip(self), fields(pipeline = %self.name))]
    pub async fn run(&self) -> Result<usize, PipelineFailure> {
        let started = Instant::now();

        let mut batch = self
            .source
            .collect()
            .await
            .map_err(|error| fail(self.source.name(), error))?;
        debug!(stage = self.source.name(), records = batch.len(), "Stage completed");

        for transform in &self.transforms {
            let input_ids = IdSet::of(&batch);
            let output = transform
                .process(batch)
                .await
                .map_err(|error| fail(transform.name(), error))?;
            input_ids
                .check(&output)
                .map_err(|error| fail(transform.name(), error))?;
            debug!(stage = transform.name(), records = output.len(), "Stage completed");
            batch = output;
        }

        let delivered = batch.len();
        self.sink
            .consume(batch)
            .await
            .map_err(|error| fail(self.sink.name(), error))?;

        info!(
            records = delivered,
            duration_ms = started.elapsed().as_millis() as u64,
            "Pipeline completed"
        );
        Ok(delivered)
    }
}

fn fail(stage: &str, error: StageError) -> PipelineFailure {
    PipelineFailure {
        stage: stage.to_string(),
        error,
    }
}

/// Record ids seen on a transform's input, used to verify its output
struct IdSet {
    ids: HashSet<String>,
    allow_missing: bool,
}

impl IdSet {
    fn of(batch: &Batch) -> Self {
        Self {
            ids: batch
                .iter()
                .filter_map(|r| r.id().map(|v| v.to_string()))
                .collect(),
            allow_missing: batch.iter().any(|r| r.id().is_none()),
        }
    }

    /// Every forwarded record must keep an id that existed on the input
    fn check(&self, output: &Batch) -> Result<(), StageError> {
        for record in output {
            match record.id() {
                Some(id) => {
                    let id = id.to_string();
                    if !self.ids.contains(&id) {
                        return Err(StageError::IdentityViolation { id });
                    }
                }
                None if self.allow_missing => {}
                None => {
                    return Err(StageError::IdentityViolation {
                        id: "<missing>".to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    name: String,
    source: Box<dyn Source>,
    transforms: Vec<Box<dyn Transform>>,
}

impl PipelineBuilder {
    /// Append a transform stage
    pub fn then(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Finish the pipeline with its sink stage
    pub fn sink(self, sink: impl Sink + 'static) -> Pipeline {
        Pipeline {
            name: self.name,
            source: self.source,
            transforms: self.transforms,
            sink: Box::new(sink),
        }
    }
}

/// The auction pipeline: scrape, check compliance, normalize, notify
pub fn default_pipeline() -> Pipeline {
    Pipeline::builder("auction", ScraperStage::new())
        .then(ComplianceStage::new())
        .then(NormalizationStage::new())
        .sink(OutreachStage::new())
}
