use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::types::{DrainCtx, Task, TaskOutcome};

/// Work performed for each task of a queue.
///
/// Tasks can run more than once (after a crash or an overlapping worker),
/// so implementations must be idempotent.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Task payload
    type Payload: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Action name, combined with the host prefix into the queue id
    const ACTION: &'static str;

    /// Count attempts and enforce the retry limit
    const TRACK_ATTEMPTS: bool = false;

    /// Called once per pass, after the lock is taken and before the first task.
    ///
    /// `ctx` carries the tenant and the cookie/session context of the trigger;
    /// health-check passes carry the engine's own trigger context.
    async fn begin_pass(&self, _ctx: &DrainCtx) {}

    /// Run one task; return `Drop` when done or `Keep` to retry it later
    async fn task(&self, task: Task<Self::Payload>) -> TaskOutcome<Self::Payload>;
}
