use std::collections::HashSet;

use parking_lot::RwLock;

use crate::types::TenantScope;

/// Answers whether a tenant still exists and may run work
pub trait TenantDirectory: Send + Sync {
    fn is_active(&self, tenant: &TenantScope) -> bool;
}

/// Single-tenant host: every tenant is considered active
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleTenant;

impl TenantDirectory for SingleTenant {
    fn is_active(&self, _tenant: &TenantScope) -> bool {
        true
    }
}

/// Fixed set of active tenants, updatable at runtime
#[derive(Debug, Default)]
pub struct StaticTenants {
    active: RwLock<HashSet<TenantScope>>,
}

impl StaticTenants {
    pub fn new<I, T>(tenants: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TenantScope>,
    {
        Self {
            active: RwLock::new(tenants.into_iter().map(Into::into).collect()),
        }
    }

    pub fn add(&self, tenant: TenantScope) {
        self.active.write().insert(tenant);
    }

    /// Remove a tenant; its queued batches are deleted when next encountered
    pub fn remove(&self, tenant: &TenantScope) -> bool {
        self.active.write().remove(tenant)
    }
}

impl TenantDirectory for StaticTenants {
    fn is_active(&self, tenant: &TenantScope) -> bool {
        self.active.read().contains(tenant)
    }
}
