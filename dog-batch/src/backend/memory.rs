use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::{
    BatchError, BatchResult,
    backend::{BatchStore, FlagStore},
    types::{Batch, BatchItems, BatchKey, BatchRecord, BatchScope},
};

struct StoredBatch {
    seq: u64,
    record: BatchRecord,
}

struct StoredFlag {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredFlag {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory store for tests, development, and single-process hosts
#[derive(Clone, Default)]
pub struct MemoryStore {
    /// Batch records indexed by key
    batches: Arc<RwLock<HashMap<BatchKey, StoredBatch>>>,

    /// Expiring flags indexed by key
    flags: Arc<RwLock<HashMap<String, StoredFlag>>>,

    /// Insertion counter used to order scans
    sequence: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn expiry(key: &str, ttl: Option<Duration>) -> BatchResult<Option<DateTime<Utc>>> {
        ttl.map(|ttl| {
            chrono::Duration::from_std(ttl)
                .map(|ttl| Utc::now() + ttl)
                .map_err(|e| BatchError::store(format!("invalid ttl for {key}: {e}")))
        })
        .transpose()
    }

    fn to_batch(key: &BatchKey, stored: &StoredBatch) -> Batch {
        Batch {
            key: key.clone(),
            record: stored.record.clone(),
        }
    }
}

#[async_trait]
impl BatchStore for MemoryStore {
    async fn insert(&self, key: &BatchKey, record: BatchRecord) -> BatchResult<()> {
        let mut batches = self.batches.write();
        if batches.contains_key(key) {
            return Err(BatchError::store(format!("batch {key} already exists")));
        }
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        batches.insert(key.clone(), StoredBatch { seq, record });
        Ok(())
    }

    async fn scan(&self, scope: &BatchScope, limit: usize) -> BatchResult<Vec<Batch>> {
        let batches = self.batches.read();
        let mut matching: Vec<_> = batches
            .iter()
            .filter(|(key, _)| scope.matches(key.as_str()))
            .collect();
        matching.sort_by_key(|(_, stored)| stored.seq);

        Ok(matching
            .into_iter()
            .take(limit)
            .map(|(key, stored)| Self::to_batch(key, stored))
            .collect())
    }

    async fn get(&self, key: &BatchKey) -> BatchResult<Option<Batch>> {
        Ok(self
            .batches
            .read()
            .get(key)
            .map(|stored| Self::to_batch(key, stored)))
    }

    async fn update_items(&self, key: &BatchKey, items: BatchItems) -> BatchResult<bool> {
        let mut batches = self.batches.write();
        match batches.get_mut(key) {
            Some(stored) => {
                stored.record.replace_items(items);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &BatchKey) -> BatchResult<bool> {
        Ok(self.batches.write().remove(key).is_some())
    }

    async fn delete_matching(&self, scope: &BatchScope) -> BatchResult<Vec<BatchKey>> {
        let mut batches = self.batches.write();
        let doomed: Vec<BatchKey> = batches
            .keys()
            .filter(|key| scope.matches(key.as_str()))
            .cloned()
            .collect();
        for key in &doomed {
            batches.remove(key);
        }
        Ok(doomed)
    }

    async fn count(&self, scope: &BatchScope) -> BatchResult<usize> {
        Ok(self
            .batches
            .read()
            .keys()
            .filter(|key| scope.matches(key.as_str()))
            .count())
    }
}

#[async_trait]
impl FlagStore for MemoryStore {
    async fn get_flag(&self, key: &str) -> BatchResult<Option<Value>> {
        let now = Utc::now();
        let mut flags = self.flags.write();
        match flags.get(key) {
            Some(flag) if flag.is_live(now) => Ok(Some(flag.value.clone())),
            Some(_) => {
                flags.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_flag(&self, key: &str, value: Value, ttl: Option<Duration>) -> BatchResult<()> {
        let expires_at = Self::expiry(key, ttl)?;
        self.flags
            .write()
            .insert(key.to_string(), StoredFlag { value, expires_at });
        Ok(())
    }

    async fn set_flag_if_absent(&self, key: &str, value: Value, ttl: Option<Duration>) -> BatchResult<bool> {
        let expires_at = Self::expiry(key, ttl)?;
        let now = Utc::now();
        let mut flags = self.flags.write();
        if flags.get(key).is_some_and(|flag| flag.is_live(now)) {
            return Ok(false);
        }
        flags.insert(key.to_string(), StoredFlag { value, expires_at });
        Ok(true)
    }

    async fn delete_flag(&self, key: &str) -> BatchResult<bool> {
        let now = Utc::now();
        Ok(self
            .flags
            .write()
            .remove(key)
            .is_some_and(|flag| flag.is_live(now)))
    }
}

/// Test helpers for deterministic testing
impl MemoryStore {
    /// Force a flag to expire (test helper)
    pub fn force_flag_expiry(&self, key: &str) {
        if let Some(flag) = self.flags.write().get_mut(key) {
            flag.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        }
    }

    /// Total number of stored batches across queues (test helper)
    pub fn batch_count(&self) -> usize {
        self.batches.read().len()
    }
}
