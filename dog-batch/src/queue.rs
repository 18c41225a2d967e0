use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::{
    backend::BatchStore,
    observability::EventBus,
    types::{Batch, BatchEvent, BatchItems, BatchKey, BatchRecord, ChainId, QueueId, Task, TenantScope},
    BatchResult,
};

/// Batch-level view of the store for one queue.
///
/// Buffers pushed tasks in memory until [`flush`](Self::flush), derives batch keys,
/// and emits batch events for every durable change.
pub struct BatchQueue {
    store: Arc<dyn BatchStore>,
    queue_id: QueueId,
    multi_tenant: bool,
    buffer: Mutex<Vec<Task<Value>>>,
    events: EventBus,
}

impl BatchQueue {
    pub fn new(store: Arc<dyn BatchStore>, queue_id: QueueId, multi_tenant: bool, events: EventBus) -> Self {
        Self {
            store,
            queue_id,
            multi_tenant,
            buffer: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Buffer a task; nothing is durable until flushed
    pub fn append(&self, task: Task<Value>) {
        self.buffer.lock().push(task);
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Persist the buffer as one new batch; an empty buffer writes nothing
    pub async fn flush(&self, tenant: &TenantScope, chain_id: &ChainId) -> BatchResult<Option<BatchKey>> {
        let tasks = std::mem::take(&mut *self.buffer.lock());
        if tasks.is_empty() {
            return Ok(None);
        }

        let items: BatchItems = tasks
            .into_iter()
            .enumerate()
            .map(|(slot, task)| (slot as u64, task))
            .collect();
        let task_count = items.len();
        let key = BatchKey::generate(&self.queue_id, self.multi_tenant.then_some(tenant));

        self.store
            .insert(&key, BatchRecord::new(tenant.clone(), items))
            .await?;

        debug!(queue_id = %self.queue_id, batch_key = %key, task_count, "Batch saved");
        self.events.emit(BatchEvent::BatchSaved {
            queue_id: self.queue_id.clone(),
            chain_id: chain_id.clone(),
            batch_key: key.clone(),
            task_count,
            at: Utc::now(),
        });
        Ok(Some(key))
    }

    /// Oldest batches, preferring the tenant's own on multi-tenant hosts
    pub async fn read_oldest(&self, tenant: &TenantScope, limit: usize) -> BatchResult<Vec<Batch>> {
        if self.multi_tenant {
            let own = self
                .store
                .scan(&self.queue_id.tenant_batch_scope(tenant), limit)
                .await?;
            if !own.is_empty() {
                return Ok(own);
            }
        }
        self.store.scan(&self.queue_id.batch_scope(), limit).await
    }

    /// Oldest batch visible from `tenant`
    pub async fn oldest(&self, tenant: &TenantScope) -> BatchResult<Option<Batch>> {
        Ok(self.read_oldest(tenant, 1).await?.into_iter().next())
    }

    pub async fn is_empty(&self, tenant: &TenantScope) -> BatchResult<bool> {
        Ok(self.oldest(tenant).await?.is_none())
    }

    /// Number of batches across all tenants
    pub async fn pending_batches(&self) -> BatchResult<usize> {
        self.store.count(&self.queue_id.batch_scope()).await
    }

    /// Tasks still stored across all batches and tenants
    pub async fn queued_tasks(&self) -> BatchResult<usize> {
        let batches = self.store.scan(&self.queue_id.batch_scope(), usize::MAX).await?;
        Ok(batches.iter().map(Batch::len).sum())
    }

    /// Persist progress; returns `false` if the batch was deleted meanwhile
    pub async fn write(&self, key: &BatchKey, items: BatchItems, chain_id: &ChainId) -> BatchResult<bool> {
        let remaining = items.len();
        let written = self.store.update_items(key, items).await?;
        if written {
            self.events.emit(BatchEvent::BatchUpdated {
                queue_id: self.queue_id.clone(),
                chain_id: chain_id.clone(),
                batch_key: key.clone(),
                remaining,
                at: Utc::now(),
            });
        } else {
            debug!(queue_id = %self.queue_id, batch_key = %key, "Batch vanished before write");
        }
        Ok(written)
    }

    pub async fn delete(&self, key: &BatchKey, chain_id: &ChainId) -> BatchResult<bool> {
        let deleted = self.store.delete(key).await?;
        if deleted {
            self.emit_deleted(key, chain_id);
        }
        Ok(deleted)
    }

    /// Delete every batch owned by `tenant`
    pub async fn delete_tenant(&self, tenant: &TenantScope, chain_id: &ChainId) -> BatchResult<usize> {
        let keys = self
            .store
            .delete_matching(&self.queue_id.tenant_batch_scope(tenant))
            .await?;
        keys.iter().for_each(|key| self.emit_deleted(key, chain_id));
        Ok(keys.len())
    }

    /// Delete every batch of this queue
    pub async fn delete_all(&self, chain_id: &ChainId) -> BatchResult<usize> {
        let keys = self
            .store
            .delete_matching(&self.queue_id.batch_scope())
            .await?;
        keys.iter().for_each(|key| self.emit_deleted(key, chain_id));
        Ok(keys.len())
    }

    fn emit_deleted(&self, key: &BatchKey, chain_id: &ChainId) {
        self.events.emit(BatchEvent::BatchDeleted {
            queue_id: self.queue_id.clone(),
            chain_id: chain_id.clone(),
            batch_key: key.clone(),
            at: Utc::now(),
        });
    }
}
