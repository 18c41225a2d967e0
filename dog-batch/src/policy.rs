use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{Batch, QueueId, Task};

/// Decides how many attempts a tracked task gets
pub trait MaxAttemptsPolicy: Send + Sync {
    fn max_attempts(&self, task: &Task<Value>, batch: &Batch, queue_id: &QueueId) -> u32;
}

/// Same limit for every task
#[derive(Debug, Clone, Copy)]
pub struct FixedMaxAttempts(pub u32);

impl Default for FixedMaxAttempts {
    fn default() -> Self {
        Self(1)
    }
}

impl MaxAttemptsPolicy for FixedMaxAttempts {
    fn max_attempts(&self, _task: &Task<Value>, _batch: &Batch, _queue_id: &QueueId) -> u32 {
        self.0
    }
}

impl<F> MaxAttemptsPolicy for F
where
    F: Fn(&Task<Value>, &Batch, &QueueId) -> u32 + Send + Sync,
{
    fn max_attempts(&self, task: &Task<Value>, batch: &Batch, queue_id: &QueueId) -> u32 {
        self(task, batch, queue_id)
    }
}

/// Extra stop condition consulted after every task
#[async_trait]
pub trait ContinueCondition: Send + Sync {
    async fn should_continue(&self, queue_id: &QueueId) -> bool;
}

/// Whether a task on its `attempts`-th attempt may run.
///
/// The first attempt always runs; later ones run while within `max_attempts`.
pub fn is_admissible(attempts: u32, max_attempts: u32) -> bool {
    attempts <= 1 || attempts <= max_attempts
}

/// Strategies fixed at engine construction
#[derive(Clone)]
pub struct EnginePolicies {
    pub max_attempts: Arc<dyn MaxAttemptsPolicy>,
    pub continue_condition: Option<Arc<dyn ContinueCondition>>,
}

impl Default for EnginePolicies {
    fn default() -> Self {
        Self {
            max_attempts: Arc::new(FixedMaxAttempts::default()),
            continue_condition: None,
        }
    }
}

impl EnginePolicies {
    pub fn with_max_attempts(mut self, policy: impl MaxAttemptsPolicy + 'static) -> Self {
        self.max_attempts = Arc::new(policy);
        self
    }

    pub fn with_continue_condition(mut self, condition: impl ContinueCondition + 'static) -> Self {
        self.continue_condition = Some(Arc::new(condition));
        self
    }
}
