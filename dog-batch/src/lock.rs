use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::{backend::FlagStore, types::QueueId, BatchResult};

/// Default lifetime of the process lock
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(60);

/// Advisory, TTL-bounded lock preventing two workers from draining one queue.
///
/// Not a mutex: a worker that outlives the TTL can overlap with the next one.
#[derive(Clone)]
pub struct ProcessLock {
    flags: Arc<dyn FlagStore>,
    queue_id: QueueId,
    ttl: Duration,
}

impl ProcessLock {
    pub fn new(flags: Arc<dyn FlagStore>, queue_id: QueueId, ttl: Duration) -> Self {
        Self { flags, queue_id, ttl }
    }

    /// Write a fresh lock marker holding the acquisition time
    pub async fn acquire(&self) -> BatchResult<()> {
        let marker = json!(Utc::now().timestamp_micros());
        self.flags
            .set_flag(&self.queue_id.lock_key(), marker, Some(self.ttl))
            .await?;
        debug!(queue_id = %self.queue_id, ttl = ?self.ttl, "Process lock acquired");
        Ok(())
    }

    /// Whether an unexpired marker exists
    pub async fn is_locked(&self) -> BatchResult<bool> {
        Ok(self.flags.get_flag(&self.queue_id.lock_key()).await?.is_some())
    }

    /// Remove the marker; releasing an unlocked queue is a no-op
    pub async fn release(&self) -> BatchResult<()> {
        if self.flags.delete_flag(&self.queue_id.lock_key()).await? {
            debug!(queue_id = %self.queue_id, "Process lock released");
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
