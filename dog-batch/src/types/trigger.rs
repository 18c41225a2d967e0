use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{ChainId, QueueId, TenantScope};

/// Wake-up call sent to a worker through the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// Queue to drain; doubles as the endpoint action
    pub action: QueueId,
    /// Short-lived token proving the trigger came from this host
    pub nonce: String,
    pub chain_id: ChainId,
    /// Tenant whose context the worker runs in
    pub tenant: TenantScope,
    /// Cookie/session context forwarded to the worker
    #[serde(default)]
    pub context: HashMap<String, String>,
}

/// Context of one drain pass
#[derive(Debug, Clone, PartialEq)]
pub struct DrainCtx {
    pub tenant: TenantScope,
    pub chain_id: ChainId,
    /// Cookie/session context carried by the trigger
    pub context: HashMap<String, String>,
}

impl DrainCtx {
    pub fn new(tenant: TenantScope, chain_id: ChainId) -> Self {
        Self {
            tenant,
            chain_id,
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, context: HashMap<String, String>) -> Self {
        self.context = context;
        self
    }
}

/// Why a pass refused to start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    /// Another worker holds the process lock
    Locked,
    /// No batches are queued
    Empty,
}

/// Terminal state of one entry-point invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// A guard refused to start the pass
    Declined(DeclineReason),
    /// The queue is paused; nothing ran or the pass stopped early
    Paused,
    /// Cancellation cleanup ran and every batch was deleted
    Cancelled,
    /// The queue drained completely
    Completed,
    /// Work remains; a new trigger was dispatched
    Rescheduled,
    /// The oldest batch belongs to another tenant and was handed to it
    HandedOff(TenantScope),
    /// Health check found nothing queued and disarmed itself
    Unscheduled,
    /// Health check found nothing to do this tick
    Skipped,
    /// A task panicked; the lock was force-released
    Aborted,
}

impl DrainOutcome {
    /// Outcome name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Declined(DeclineReason::Locked) => "declined_locked",
            Self::Declined(DeclineReason::Empty) => "declined_empty",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Rescheduled => "rescheduled",
            Self::HandedOff(_) => "handed_off",
            Self::Unscheduled => "unscheduled",
            Self::Skipped => "skipped",
            Self::Aborted => "aborted",
        }
    }
}
