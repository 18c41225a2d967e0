use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{BatchKey, Task, TenantScope};

/// Sparse slot map; removing a task never renumbers the others
pub type BatchItems = BTreeMap<u64, Task<Value>>;

/// Persisted body of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    /// Tenant that flushed the batch
    pub tenant: TenantScope,
    pub items: BatchItems,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchRecord {
    /// Create a record stamped with the current time
    pub fn new(tenant: TenantScope, items: BatchItems) -> Self {
        let now = Utc::now();
        Self {
            tenant,
            items,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the items and bump `updated_at`
    pub fn replace_items(&mut self, items: BatchItems) {
        self.items = items;
        self.updated_at = Utc::now().max(self.created_at);
    }

    /// Whether the batch was written since it was flushed
    pub fn is_touched(&self) -> bool {
        self.updated_at > self.created_at
    }
}

/// A batch as read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub key: BatchKey,
    pub record: BatchRecord,
}

impl Batch {
    pub fn tenant(&self) -> &TenantScope {
        &self.record.tenant
    }

    pub fn items(&self) -> &BatchItems {
        &self.record.items
    }

    pub fn len(&self) -> usize {
        self.record.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.items.is_empty()
    }
}
