//! Single-consumer event loop driving pipeline runs.
//!
//! Producers (the interval trigger, the CLI, tests) hold a [`TriggerSender`]
//! and only ever enqueue. The loop owns the receiving end exclusively and runs
//! one pipeline at a time, so two triggers arriving close together never
//! produce overlapping runs: the second simply waits in the queue.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::pipeline::Pipeline;
use super::wait_for_shutdown;
use crate::domain::{RunOutcome, RunReport, TriggerEvent};

/// What to do with a trigger whose tag is already waiting in the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoalescePolicy {
    /// Enqueue every trigger; a slow pipeline builds a backlog
    #[default]
    Queue,

    /// Drop a trigger if one with the same tag has not been taken yet
    Coalesce,
}

/// The event loop is gone and can no longer accept triggers
#[derive(Debug, Clone, Copy, Error)]
#[error("event loop has shut down")]
pub struct LoopClosed;

/// Result of handing a trigger to the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Added to the queue
    Enqueued,

    /// An identical trigger was already waiting; this one was dropped
    Coalesced,
}

type PendingTags = Arc<Mutex<HashSet<String>>>;

fn lock(pending: &PendingTags) -> MutexGuard<'_, HashSet<String>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Wakes the loop once more when the last sender is dropped
#[derive(Debug)]
struct WakeOnDrop(Arc<Notify>);

impl Drop for WakeOnDrop {
    fn drop(&mut self) {
        self.0.notify_one();
    }
}

#[derive(Debug)]
struct SenderInner {
    tx: mpsc::UnboundedSender<TriggerEvent>,
    pending: PendingTags,
    policy: CoalescePolicy,
    // Last field: the channel is closed before the loop is woken
    wake: WakeOnDrop,
}

/// Cloneable handle for enqueueing trigger events
#[derive(Debug, Clone)]
pub struct TriggerSender {
    inner: Arc<SenderInner>,
}

impl TriggerSender {
    /// Enqueue a trigger for the loop
    pub fn send(&self, event: TriggerEvent) -> Result<EnqueueResult, LoopClosed> {
        let inner = &*self.inner;
        if inner.policy == CoalescePolicy::Queue {
            inner.tx.send(event).map_err(|_| LoopClosed)?;
            inner.wake.0.notify_one();
            return Ok(EnqueueResult::Enqueued);
        }

        {
            // The loop takes this lock to dequeue, so a marked tag is always
            // still in the queue
            let mut pending = lock(&inner.pending);
            if pending.contains(&event.tag) {
                return Ok(EnqueueResult::Coalesced);
            }
            let tag = event.tag.clone();
            inner.tx.send(event).map_err(|_| LoopClosed)?;
            pending.insert(tag);
        }
        inner.wake.0.notify_one();
        Ok(EnqueueResult::Enqueued)
    }

    /// Whether the loop has stopped receiving
    pub fn is_closed(&self) -> bool {
        self.inner.tx.is_closed()
    }
}

/// Counters accumulated over the lifetime of a loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub completed: usize,
    pub failed: usize,
    /// Triggers whose tag had no registered pipeline
    pub ignored: usize,
}

impl LoopStats {
    /// Total pipeline runs executed
    pub fn runs(&self) -> usize {
        self.completed + self.failed
    }
}

/// The loop that serializes pipeline runs
pub struct EventLoop {
    rx: mpsc::UnboundedReceiver<TriggerEvent>,
    pending: PendingTags,
    wake: Arc<Notify>,
    pipelines: HashMap<String, Arc<Pipeline>>,
    observer: Option<mpsc::UnboundedSender<RunReport>>,
}

impl EventLoop {
    /// Create a loop and the sender feeding it
    pub fn new(policy: CoalescePolicy) -> (Self, TriggerSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = PendingTags::default();
        let wake = Arc::new(Notify::new());

        let event_loop = Self {
            rx,
            pending: pending.clone(),
            wake: wake.clone(),
            pipelines: HashMap::new(),
            observer: None,
        };
        let sender = TriggerSender {
            inner: Arc::new(SenderInner {
                tx,
                pending,
                policy,
                wake: WakeOnDrop(wake),
            }),
        };
        (event_loop, sender)
    }

    /// Register the pipeline run for triggers tagged `tag`
    pub fn register(mut self, tag: impl Into<String>, pipeline: Pipeline) -> Self {
        self.pipelines.insert(tag.into(), Arc::new(pipeline));
        self
    }

    /// Receive a report after every run
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<RunReport> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        rx
    }

    /// Registered trigger tags
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.pipelines.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Consume triggers until shutdown is requested or every sender is gone.
    ///
    /// A run already in progress when shutdown is requested finishes; no new
    /// run starts afterwards and any queued triggers are discarded.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> LoopStats {
        let mut stats = LoopStats::default();
        info!(tags = ?self.tags(), "Event loop started");

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, event loop stopping");
                break;
            }

            let event = match self.try_take() {
                Ok(Some(event)) => event,
                Ok(None) => {
                    tokio::select! {
                        biased;
                        _ = wait_for_shutdown(&mut shutdown) => {
                            info!("Shutdown requested, event loop stopping");
                            break;
                        }
                        _ = self.wake.notified() => continue,
                    }
                }
                Err(LoopClosed) => {
                    info!("All trigger senders dropped, event loop stopping");
                    break;
                }
            };

            let Some(pipeline) = self.pipelines.get(&event.tag).cloned() else {
                warn!(tag = %event.tag, "No pipeline registered for trigger, ignoring");
                stats.ignored += 1;
                continue;
            };

            let report = self.run_once(&event, pipeline).await;
            if report.is_success() {
                stats.completed += 1;
            } else {
                stats.failed += 1;
            }

            if let Some(observer) = &self.observer {
                let _ = observer.send(report);
            }
        }

        info!(
            completed = stats.completed,
            failed = stats.failed,
            ignored = stats.ignored,
            "Event loop stopped"
        );
        stats
    }

    /// Dequeue the next trigger, if any, and clear its pending mark under the
    /// lock senders hold while coalescing
    fn try_take(&mut self) -> Result<Option<TriggerEvent>, LoopClosed> {
        let mut pending = lock(&self.pending);
        match self.rx.try_recv() {
            Ok(event) => {
                pending.remove(&event.tag);
                Ok(Some(event))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(LoopClosed),
        }
    }

    /// Execute one run, turning any stage failure or panic into a report
    #[instrument(skip(self, pipeline), fields(tag = %event.tag))]
    async fn run_once(&self, event: &TriggerEvent, pipeline: Arc<Pipeline>) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, pipeline = pipeline.name(), "Run started");

        // Spawned so a panicking stage is contained; awaited immediately so
        // runs stay strictly sequential.
        let result = tokio::spawn(async move { pipeline.run().await }).await;

        let outcome = match result {
            Ok(Ok(records)) => {
                info!(%run_id, records, "Run completed");
                RunOutcome::Completed { records }
            }
            Ok(Err(failure)) => {
                error!(%run_id, stage = %failure.stage, error = %failure.error, "Run failed");
                RunOutcome::Failed {
                    stage: failure.stage,
                    error: failure.error.to_string(),
                }
            }
            Err(join_error) => {
                error!(%run_id, error = %join_error, "Run aborted");
                RunOutcome::Failed {
                    stage: "<unknown>".to_string(),
                    error: join_error.to_string(),
                }
            }
        };

        RunReport {
            run_id,
            tag: event.tag.clone(),
            started_at,
            completed_at: Utc::now(),
            outcome,
        }
    }
}
