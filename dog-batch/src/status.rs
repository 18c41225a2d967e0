use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::{
    backend::FlagStore,
    types::{ProcessStatus, QueueId},
    BatchResult,
};

/// Persisted pause/cancel state of one queue, read fresh on every check
#[derive(Clone)]
pub struct StatusRegister {
    flags: Arc<dyn FlagStore>,
    queue_id: QueueId,
}

impl StatusRegister {
    pub fn new(flags: Arc<dyn FlagStore>, queue_id: QueueId) -> Self {
        Self { flags, queue_id }
    }

    /// Current status; an absent or unreadable entry reads as `None`
    pub async fn read(&self) -> BatchResult<ProcessStatus> {
        let stored = self.flags.get_flag(&self.queue_id.status_key()).await?;
        Ok(stored
            .and_then(|value| value.as_u64())
            .map(ProcessStatus::from_code)
            .unwrap_or_default())
    }

    /// Store `status`; writing `None` removes the entry
    pub async fn write(&self, status: ProcessStatus) -> BatchResult<()> {
        match status.code() {
            Some(code) => {
                self.flags
                    .set_flag(&self.queue_id.status_key(), json!(code), None)
                    .await
            }
            None => {
                self.flags.delete_flag(&self.queue_id.status_key()).await?;
                Ok(())
            }
        }
    }

    /// Pause, stamping the time when the pause may later time out
    pub async fn pause(&self, with_timeout: bool) -> BatchResult<()> {
        if with_timeout {
            self.flags
                .set_flag(
                    &self.queue_id.pause_timestamp_key(),
                    json!(Utc::now().timestamp_millis()),
                    None,
                )
                .await?;
            self.write(ProcessStatus::PausedWithTimeout).await
        } else {
            self.write(ProcessStatus::PausedNoTimeout).await
        }
    }

    /// Timed pause that only takes effect while the queue is running.
    ///
    /// Returns `false`, leaving the stored status alone, when a pause or a
    /// cancellation is already recorded.
    pub async fn pause_if_running(&self) -> BatchResult<bool> {
        self.flags
            .set_flag(
                &self.queue_id.pause_timestamp_key(),
                json!(Utc::now().timestamp_millis()),
                None,
            )
            .await?;
        self.flags
            .set_flag_if_absent(
                &self.queue_id.status_key(),
                json!(ProcessStatus::PausedWithTimeout.code()),
                None,
            )
            .await
    }

    /// Remove status and pause timestamp
    pub async fn clear(&self) -> BatchResult<()> {
        self.flags.delete_flag(&self.queue_id.status_key()).await?;
        self.flags
            .delete_flag(&self.queue_id.pause_timestamp_key())
            .await?;
        Ok(())
    }

    /// When the current timed pause began
    pub async fn paused_at(&self) -> BatchResult<Option<DateTime<Utc>>> {
        let stored = self
            .flags
            .get_flag(&self.queue_id.pause_timestamp_key())
            .await?;
        Ok(stored
            .and_then(|value| value.as_i64())
            .and_then(DateTime::<Utc>::from_timestamp_millis))
    }

    /// Whether a timed pause has lasted at least `threshold`.
    ///
    /// A missing timestamp counts as expired.
    pub async fn pause_expired(&self, threshold: Duration) -> BatchResult<bool> {
        let Some(paused_at) = self.paused_at().await? else {
            return Ok(true);
        };
        let elapsed = (Utc::now() - paused_at).to_std().unwrap_or(Duration::ZERO);
        Ok(elapsed >= threshold)
    }

    /// Backdate the pause timestamp (test and admin helper)
    pub async fn set_paused_at(&self, at: DateTime<Utc>) -> BatchResult<()> {
        self.flags
            .set_flag(
                &self.queue_id.pause_timestamp_key(),
                json!(at.timestamp_millis()),
                None,
            )
            .await
    }
}
