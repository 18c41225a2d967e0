#[cfg(feature = "memory")]
pub mod memory;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use serde_json::Value;

use crate::{
    BatchResult,
    types::{Batch, BatchItems, BatchKey, BatchRecord, BatchScope},
};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Durable storage of batch records.
///
/// Every write must be durable before the call returns; a worker may die right after.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Persist a brand-new batch
    async fn insert(&self, key: &BatchKey, record: BatchRecord) -> BatchResult<()>;

    /// Batches within `scope`, oldest first, at most `limit`
    async fn scan(&self, scope: &BatchScope, limit: usize) -> BatchResult<Vec<Batch>>;

    /// Fetch one batch
    async fn get(&self, key: &BatchKey) -> BatchResult<Option<Batch>>;

    /// Replace the items of an existing batch, bumping `updated_at`.
    ///
    /// Returns `false` when the batch no longer exists; the write is then dropped.
    async fn update_items(&self, key: &BatchKey, items: BatchItems) -> BatchResult<bool>;

    /// Delete one batch, returning whether it existed
    async fn delete(&self, key: &BatchKey) -> BatchResult<bool>;

    /// Delete every batch within `scope`
    async fn delete_matching(&self, scope: &BatchScope) -> BatchResult<Vec<BatchKey>>;

    /// Number of batches within `scope`
    async fn count(&self, scope: &BatchScope) -> BatchResult<usize>;
}

/// Small expiring key/value entries: locks, status codes, timestamps
#[async_trait]
pub trait FlagStore: Send + Sync {
    /// Read a flag; expired flags read as absent
    async fn get_flag(&self, key: &str) -> BatchResult<Option<Value>>;

    /// Write a flag, optionally expiring after `ttl`
    async fn set_flag(&self, key: &str, value: Value, ttl: Option<Duration>) -> BatchResult<()>;

    /// Write a flag only if no live flag holds `key`; returns whether it was written.
    ///
    /// The check and the write must be atomic.
    async fn set_flag_if_absent(&self, key: &str, value: Value, ttl: Option<Duration>) -> BatchResult<bool>;

    /// Remove a flag, returning whether a live one existed
    async fn delete_flag(&self, key: &str) -> BatchResult<bool>;
}
