use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of one background queue, e.g. `app_send_notifications`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueId(pub String);

impl QueueId {
    /// Derive the queue id from a host prefix and an executor action name
    pub fn derive(prefix: &str, action: &str) -> Self {
        if prefix.is_empty() {
            Self(action.to_string())
        } else {
            Self(format!("{prefix}_{action}"))
        }
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the persisted status register
    pub fn status_key(&self) -> String {
        format!("{}_status", self.0)
    }

    /// Key of the persisted pause timestamp
    pub fn pause_timestamp_key(&self) -> String {
        format!("{}_pause_timestamp", self.0)
    }

    /// Key of the advisory process lock
    pub fn lock_key(&self) -> String {
        format!("{}_process_lock", self.0)
    }

    /// Prefix shared by every batch of this queue, across tenants
    pub fn batch_prefix(&self) -> String {
        format!("{}_batch_", self.0)
    }

    /// Prefix shared by every batch of this queue owned by `tenant`
    pub fn tenant_batch_prefix(&self, tenant: &TenantScope) -> String {
        format!("{}_batch_{}{}_", self.0, SCOPE_MARKER, tenant.0)
    }

    /// Every batch of this queue, across tenants
    pub fn batch_scope(&self) -> BatchScope {
        BatchScope {
            prefix: self.batch_prefix(),
            any_tenant: true,
        }
    }

    /// Batches of this queue owned by `tenant`
    pub fn tenant_batch_scope(&self, tenant: &TenantScope) -> BatchScope {
        BatchScope {
            prefix: self.tenant_batch_prefix(tenant),
            any_tenant: false,
        }
    }
}

const SCOPE_MARKER: &str = "scope_";

/// Digits of the time-ordered suffix: 20 for micros, 6 for the salt
const STAMP_LEN: usize = 26;

fn is_stamp(s: &str) -> bool {
    s.len() == STAMP_LEN && s.bytes().all(|b| b.is_ascii_digit())
}

/// Set of batch keys a store operation applies to.
///
/// Queue ids and tenant ids may contain `_`, so a bare prefix can reach into a
/// neighbouring queue or tenant. Stores narrow a prefix scan with [`matches`](Self::matches).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchScope {
    prefix: String,
    any_tenant: bool,
}

impl BatchScope {
    /// Key prefix every member starts with; usable for an index range scan
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, key: &str) -> bool {
        let Some(rest) = key.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        if is_stamp(rest) {
            return true;
        }
        self.any_tenant
            && rest
                .strip_prefix(SCOPE_MARKER)
                .and_then(|scoped| scoped.rsplit_once('_'))
                .is_some_and(|(tenant, stamp)| !tenant.is_empty() && is_stamp(stamp))
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for QueueId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for QueueId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Storage key of one persisted batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchKey(pub String);

impl BatchKey {
    /// Generate a fresh key for a new batch.
    ///
    /// Multi-tenant hosts embed the owning tenant so a tenant-scoped prefix scan finds it.
    pub fn generate(queue_id: &QueueId, tenant: Option<&TenantScope>) -> Self {
        let prefix = match tenant {
            Some(tenant) => queue_id.tenant_batch_prefix(tenant),
            None => queue_id.batch_prefix(),
        };
        let micros = Utc::now().timestamp_micros().max(0);
        let salt: u32 = rand::thread_rng().gen_range(0..1_000_000);
        Self(format!("{prefix}{micros:020}{salt:06}"))
    }

    /// Create a batch key from a string
    pub fn from_string(key: String) -> Self {
        Self(key)
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BatchKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Correlation id of one logical processing run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub String);

impl ChainId {
    /// Generate a new chain id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a chain id from a string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChainId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChainId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ChainId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Tenant that owns a batch (a site in a multi-site host)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope(pub String);

impl TenantScope {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantScope {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantScope {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
