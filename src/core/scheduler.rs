//! Interval trigger for the event loop.
//!
//! The timer never runs pipeline logic itself. Each tick only enqueues a
//! trigger event, leaving serialization to the event loop.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::event_loop::{EnqueueResult, TriggerSender};
use super::wait_for_shutdown;
use crate::domain::TriggerEvent;

/// A recurring fixed-interval schedule
#[derive(Debug, Clone)]
pub struct IntervalTrigger {
    event: TriggerEvent,
    period: Duration,
    run_on_start: bool,
}

impl IntervalTrigger {
    /// Fire `tag` every `period`. The first fire happens one period from now.
    pub fn new(tag: impl Into<String>, period: Duration) -> Self {
        Self {
            event: TriggerEvent::new(tag),
            period: period.max(Duration::from_millis(1)),
            run_on_start: false,
        }
    }

    /// Also fire immediately when the trigger starts
    pub fn run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    /// Run the schedule in the background until shutdown or until the loop
    /// stops accepting events. The task resolves to the number of triggers
    /// actually enqueued.
    pub fn spawn(self, sender: TriggerSender, mut shutdown: watch::Receiver<bool>) -> JoinHandle<u64> {
        tokio::spawn(async move {
            let start = if self.run_on_start {
                Instant::now()
            } else {
                Instant::now() + self.period
            };
            let mut ticker = time::interval_at(start, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(tag = %self.event, period_secs = self.period.as_secs_f64(), "Interval trigger started");
            let mut fired = 0u64;

            loop {
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => break,
                    _ = ticker.tick() => {}
                }

                match sender.send(self.event.clone()) {
                    Ok(EnqueueResult::Enqueued) => {
                        fired += 1;
                        debug!(tag = %self.event, "Trigger enqueued");
                    }
                    Ok(EnqueueResult::Coalesced) => {
                        debug!(tag = %self.event, "Trigger already pending, coalesced");
                    }
                    Err(_) => {
                        info!(tag = %self.event, "Event loop closed, interval trigger stopping");
                        break;
                    }
                }
            }

            fired
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_loop::{CoalescePolicy, EventLoop};

    #[tokio::test(start_paused = true)]
    async fn test_fires_on_each_period() {
        let (event_loop, sender) = EventLoop::new(CoalescePolicy::Queue);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = IntervalTrigger::new("scrape", Duration::from_secs(300)).spawn(sender, shutdown_rx);

        time::sleep(Duration::from_secs(300 * 3 + 10)).await;
        shutdown_tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), 3);
        drop(event_loop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_on_start_fires_immediately() {
        let (event_loop, sender) = EventLoop::new(CoalescePolicy::Queue);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = IntervalTrigger::new("scrape", Duration::from_secs(60))
            .run_on_start(true)
            .spawn(sender, shutdown_rx);

        time::sleep(Duration::from_secs(1)).await;
        shutdown_tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), 1);
        drop(event_loop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_fires_are_not_counted() {
        let (event_loop, sender) = EventLoop::new(CoalescePolicy::Coalesce);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Nobody consumes, so every fire after the first finds the tag pending
        let handle = IntervalTrigger::new("scrape", Duration::from_secs(10)).spawn(sender, shutdown_rx);

        time::sleep(Duration::from_secs(55)).await;
        shutdown_tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), 1);
        drop(event_loop);
    }

    #[tokio::test]
    async fn test_stops_when_loop_is_gone() {
        let (event_loop, sender) = EventLoop::new(CoalescePolicy::Queue);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(event_loop);

        let handle = IntervalTrigger::new("scrape", Duration::from_millis(5))
            .run_on_start(true)
            .spawn(sender, shutdown_rx);

        assert_eq!(handle.await.unwrap(), 0);
    }
}
