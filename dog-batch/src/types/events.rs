use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BatchKey, ChainId, QueueId};

/// Lifecycle events emitted by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BatchEvent {
    /// A buffered set of tasks was flushed into a new batch
    BatchSaved {
        queue_id: QueueId,
        chain_id: ChainId,
        batch_key: BatchKey,
        task_count: usize,
        at: DateTime<Utc>,
    },

    /// Batch progress was persisted
    BatchUpdated {
        queue_id: QueueId,
        chain_id: ChainId,
        batch_key: BatchKey,
        remaining: usize,
        at: DateTime<Utc>,
    },

    /// A batch was removed
    BatchDeleted {
        queue_id: QueueId,
        chain_id: ChainId,
        batch_key: BatchKey,
        at: DateTime<Utc>,
    },

    ProcessLocked {
        queue_id: QueueId,
        chain_id: ChainId,
        at: DateTime<Utc>,
    },

    ProcessUnlocked {
        queue_id: QueueId,
        chain_id: ChainId,
        at: DateTime<Utc>,
    },

    Paused {
        queue_id: QueueId,
        chain_id: ChainId,
        at: DateTime<Utc>,
    },

    Resumed {
        queue_id: QueueId,
        chain_id: ChainId,
        at: DateTime<Utc>,
    },

    Cancelled {
        queue_id: QueueId,
        chain_id: ChainId,
        at: DateTime<Utc>,
    },

    /// The queue drained completely
    Completed {
        queue_id: QueueId,
        chain_id: ChainId,
        at: DateTime<Utc>,
    },
}

impl BatchEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::BatchSaved { .. } => "batch_saved",
            Self::BatchUpdated { .. } => "batch_updated",
            Self::BatchDeleted { .. } => "batch_deleted",
            Self::ProcessLocked { .. } => "process_locked",
            Self::ProcessUnlocked { .. } => "process_unlocked",
            Self::Paused { .. } => "paused",
            Self::Resumed { .. } => "resumed",
            Self::Cancelled { .. } => "cancelled",
            Self::Completed { .. } => "completed",
        }
    }

    /// Get the queue id from any event
    pub fn queue_id(&self) -> &QueueId {
        match self {
            Self::BatchSaved { queue_id, .. }
            | Self::BatchUpdated { queue_id, .. }
            | Self::BatchDeleted { queue_id, .. }
            | Self::ProcessLocked { queue_id, .. }
            | Self::ProcessUnlocked { queue_id, .. }
            | Self::Paused { queue_id, .. }
            | Self::Resumed { queue_id, .. }
            | Self::Cancelled { queue_id, .. }
            | Self::Completed { queue_id, .. } => queue_id,
        }
    }

    /// Get the chain id from any event
    pub fn chain_id(&self) -> &ChainId {
        match self {
            Self::BatchSaved { chain_id, .. }
            | Self::BatchUpdated { chain_id, .. }
            | Self::BatchDeleted { chain_id, .. }
            | Self::ProcessLocked { chain_id, .. }
            | Self::ProcessUnlocked { chain_id, .. }
            | Self::Paused { chain_id, .. }
            | Self::Resumed { chain_id, .. }
            | Self::Cancelled { chain_id, .. }
            | Self::Completed { chain_id, .. } => chain_id,
        }
    }

    /// Batch key for batch-level events
    pub fn batch_key(&self) -> Option<&BatchKey> {
        match self {
            Self::BatchSaved { batch_key, .. }
            | Self::BatchUpdated { batch_key, .. }
            | Self::BatchDeleted { batch_key, .. } => Some(batch_key),
            _ => None,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::BatchSaved { at, .. }
            | Self::BatchUpdated { at, .. }
            | Self::BatchDeleted { at, .. }
            | Self::ProcessLocked { at, .. }
            | Self::ProcessUnlocked { at, .. }
            | Self::Paused { at, .. }
            | Self::Resumed { at, .. }
            | Self::Cancelled { at, .. }
            | Self::Completed { at, .. } => at,
        }
    }
}
