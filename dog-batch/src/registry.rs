use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use crate::{
    types::{DrainOutcome, ProcessStatus, QueueId, TenantScope, TriggerRequest},
    BatchError, BatchResult,
};

/// Type-erased engine for runtime dispatch by queue id
#[async_trait]
pub trait BackgroundProcess: Send + Sync {
    fn queue_id(&self) -> &QueueId;

    /// Tenant assumed when a trigger carries none
    fn home_tenant(&self) -> &TenantScope;

    /// Check a trigger nonce minted for this queue
    fn verify_nonce(&self, nonce: &str) -> bool;

    /// Entry point for an incoming trigger
    async fn handle_trigger(&self, request: TriggerRequest) -> BatchResult<DrainOutcome>;

    /// Entry point for the periodic health check
    async fn health_check(&self) -> BatchResult<DrainOutcome>;

    async fn pause(&self, with_timeout: bool) -> BatchResult<()>;

    async fn resume(&self, dispatch: bool) -> BatchResult<()>;

    async fn cancel(&self) -> BatchResult<()>;

    async fn delete_all(&self) -> BatchResult<usize>;

    async fn status(&self) -> BatchResult<ProcessStatus>;
}

/// Registry of engines by queue id, owned by the composition root
#[derive(Default)]
pub struct EngineRegistry {
    engines: RwLock<HashMap<QueueId, Arc<dyn BackgroundProcess>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine; each queue id maps to exactly one engine
    pub fn register(&self, engine: Arc<dyn BackgroundProcess>) -> BatchResult<()> {
        let queue_id = engine.queue_id().clone();
        let mut engines = self.engines.write();
        if engines.contains_key(&queue_id) {
            return Err(BatchError::QueueAlreadyRegistered(queue_id.to_string()));
        }
        info!(%queue_id, "Registered background process");
        engines.insert(queue_id, engine);
        Ok(())
    }

    pub fn get(&self, queue_id: &QueueId) -> BatchResult<Arc<dyn BackgroundProcess>> {
        self.engines
            .read()
            .get(queue_id)
            .cloned()
            .ok_or_else(|| BatchError::QueueNotRegistered(queue_id.to_string()))
    }

    pub fn contains(&self, queue_id: &QueueId) -> bool {
        self.engines.read().contains_key(queue_id)
    }

    /// Registered queue ids, sorted
    pub fn queue_ids(&self) -> Vec<QueueId> {
        let mut ids: Vec<_> = self.engines.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Route a trigger to its engine
    pub async fn handle_trigger(&self, request: TriggerRequest) -> BatchResult<DrainOutcome> {
        let engine = self.get(&request.action)?;
        engine.handle_trigger(request).await
    }
}
