use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    registry::BackgroundProcess,
    types::{DrainOutcome, QueueId},
    BatchResult,
};

/// Recurring timer that fires an engine's health check.
///
/// Scheduling an already armed queue is a no-op.
pub trait HealthScheduler: Send + Sync {
    fn schedule(&self, queue_id: &QueueId, every: Duration, target: Weak<dyn BackgroundProcess>);

    fn unschedule(&self, queue_id: &QueueId);

    fn is_scheduled(&self, queue_id: &QueueId) -> bool;
}

/// Runs one tokio interval per armed queue.
///
/// Disarming is cooperative; the loop exits on its next tick.
#[derive(Clone, Default)]
pub struct TokioScheduler {
    armed: Arc<Mutex<HashMap<QueueId, u64>>>,
    generation: Arc<AtomicU64>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HealthScheduler for TokioScheduler {
    fn schedule(&self, queue_id: &QueueId, every: Duration, target: Weak<dyn BackgroundProcess>) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(%queue_id, error = %e, "Cannot arm health check outside a runtime");
                return;
            }
        };

        let generation = {
            let mut armed = self.armed.lock();
            if armed.contains_key(queue_id) {
                return;
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst);
            armed.insert(queue_id.clone(), generation);
            generation
        };

        info!(%queue_id, interval = ?every, "Health check armed");
        let armed = Arc::clone(&self.armed);
        let queue_id = queue_id.clone();

        runtime.spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if armed.lock().get(&queue_id) != Some(&generation) {
                    debug!(%queue_id, "Health check loop exiting, disarmed");
                    return;
                }
                let Some(process) = target.upgrade() else {
                    debug!(%queue_id, "Health check target dropped");
                    break;
                };

                match process.health_check().await {
                    Ok(outcome) => debug!(%queue_id, outcome = outcome.name(), "Health check ran"),
                    Err(e) => warn!(%queue_id, error = %e, "Health check failed"),
                }
            }

            let mut armed = armed.lock();
            if armed.get(&queue_id) == Some(&generation) {
                armed.remove(&queue_id);
            }
        });
    }

    fn unschedule(&self, queue_id: &QueueId) {
        if self.armed.lock().remove(queue_id).is_some() {
            info!(%queue_id, "Health check disarmed");
        }
    }

    fn is_scheduled(&self, queue_id: &QueueId) -> bool {
        self.armed.lock().contains_key(queue_id)
    }
}

struct ManualEntry {
    every: Duration,
    target: Weak<dyn BackgroundProcess>,
}

/// Scheduler fired by the host, e.g. from an external cron
#[derive(Clone, Default)]
pub struct ManualScheduler {
    entries: Arc<Mutex<HashMap<QueueId, ManualEntry>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interval the queue was armed with
    pub fn interval(&self, queue_id: &QueueId) -> Option<Duration> {
        self.entries.lock().get(queue_id).map(|entry| entry.every)
    }

    /// Run the health check of one armed queue now
    pub async fn fire(&self, queue_id: &QueueId) -> Option<BatchResult<DrainOutcome>> {
        let target = self.entries.lock().get(queue_id)?.target.upgrade()?;
        Some(target.health_check().await)
    }

    /// Run every armed health check once
    pub async fn fire_all(&self) -> Vec<(QueueId, BatchResult<DrainOutcome>)> {
        let targets: Vec<_> = self
            .entries
            .lock()
            .iter()
            .filter_map(|(id, entry)| entry.target.upgrade().map(|t| (id.clone(), t)))
            .collect();

        let mut results = Vec::with_capacity(targets.len());
        for (queue_id, target) in targets {
            results.push((queue_id, target.health_check().await));
        }
        results
    }
}

impl HealthScheduler for ManualScheduler {
    fn schedule(&self, queue_id: &QueueId, every: Duration, target: Weak<dyn BackgroundProcess>) {
        self.entries
            .lock()
            .entry(queue_id.clone())
            .or_insert(ManualEntry { every, target });
    }

    fn unschedule(&self, queue_id: &QueueId) {
        self.entries.lock().remove(queue_id);
    }

    fn is_scheduled(&self, queue_id: &QueueId) -> bool {
        self.entries.lock().contains_key(queue_id)
    }
}
