use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::{lock::DEFAULT_LOCK_TTL, types::TenantScope, BatchError, BatchResult};

/// Shortest allowed health-check interval
pub const MIN_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for a batch engine
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Host prefix combined with the executor action into the queue id
    pub host_prefix: String,
    /// Lifetime of the process lock; must exceed `time_budget`
    pub lock_ttl: Duration,
    /// Wall-clock budget of one drain pass
    pub time_budget: Duration,
    /// Memory ceiling in bytes; total system memory when unset
    pub memory_ceiling: Option<u64>,
    /// Fraction of the ceiling at which a pass stops
    pub memory_threshold: f64,
    /// Pause between two tasks
    pub throttle: Duration,
    /// Period of the self-healing health check
    pub health_check_interval: Duration,
    /// Request timeout of the fire-and-forget trigger
    pub dispatch_timeout: Duration,
    /// Endpoint receiving trigger requests
    pub trigger_url: String,
    /// Secret used to sign trigger nonces
    pub nonce_secret: String,
    /// How long a nonce stays valid
    pub nonce_lifetime: Duration,
    /// Batches are tenant-scoped and scans fall back across tenants
    pub multi_tenant: bool,
    /// Tenant this worker runs as when no trigger says otherwise
    pub home_tenant: TenantScope,
    /// Capacity of the lifecycle event channel
    pub event_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            host_prefix: "dog".to_string(),
            lock_ttl: DEFAULT_LOCK_TTL,
            time_budget: Duration::from_secs(20),
            memory_ceiling: None,
            memory_threshold: 0.9,
            throttle: Duration::ZERO,
            health_check_interval: Duration::from_secs(300), // 5 minutes
            dispatch_timeout: Duration::from_millis(10),
            trigger_url: "http://127.0.0.1:3030/batch".to_string(),
            nonce_secret: String::new(),
            nonce_lifetime: Duration::from_secs(12 * 3600),
            multi_tenant: false,
            home_tenant: TenantScope::default(),
            event_capacity: 1000,
        }
    }
}

impl BatchConfig {
    /// Load configuration from `.env` and `{PREFIX}_*` environment variables
    pub fn from_env(prefix: &str) -> BatchResult<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let key = |name: &str| format!("{}_{}", prefix.to_uppercase(), name);

        let config = Self {
            host_prefix: env_or(&key("HOST_PREFIX"), defaults.host_prefix),
            lock_ttl: Duration::from_secs(env_or(&key("LOCK_TTL_SECS"), defaults.lock_ttl.as_secs())),
            time_budget: Duration::from_secs(env_or(
                &key("TIME_BUDGET_SECS"),
                defaults.time_budget.as_secs(),
            )),
            memory_ceiling: std::env::var(key("MEMORY_CEILING_BYTES"))
                .ok()
                .and_then(|v| v.parse().ok()),
            memory_threshold: env_or(&key("MEMORY_THRESHOLD"), defaults.memory_threshold),
            throttle: Duration::from_millis(env_or(
                &key("THROTTLE_MS"),
                defaults.throttle.as_millis() as u64,
            )),
            health_check_interval: Duration::from_secs(
                env_or(
                    &key("HEALTH_CHECK_INTERVAL_MINS"),
                    defaults.health_check_interval.as_secs() / 60,
                ) * 60,
            ),
            dispatch_timeout: Duration::from_millis(env_or(
                &key("DISPATCH_TIMEOUT_MS"),
                defaults.dispatch_timeout.as_millis() as u64,
            )),
            trigger_url: env_or(&key("TRIGGER_URL"), defaults.trigger_url),
            nonce_secret: env_or(&key("NONCE_SECRET"), defaults.nonce_secret),
            nonce_lifetime: Duration::from_secs(env_or(
                &key("NONCE_LIFETIME_SECS"),
                defaults.nonce_lifetime.as_secs(),
            )),
            multi_tenant: env_or(&key("MULTI_TENANT"), defaults.multi_tenant),
            home_tenant: TenantScope::new(env_or(
                &key("HOME_TENANT"),
                defaults.home_tenant.0,
            )),
            event_capacity: env_or(&key("EVENT_CAPACITY"), defaults.event_capacity),
        };

        config.validate()
    }

    /// Check invariants, clamping the health interval to its minimum
    pub fn validate(mut self) -> BatchResult<Self> {
        if self.health_check_interval < MIN_HEALTH_CHECK_INTERVAL {
            warn!(
                requested = ?self.health_check_interval,
                "Health check interval below minimum, clamping to 1 minute"
            );
            self.health_check_interval = MIN_HEALTH_CHECK_INTERVAL;
        }
        if self.lock_ttl <= self.time_budget {
            return Err(BatchError::config(format!(
                "lock ttl {:?} must exceed time budget {:?}",
                self.lock_ttl, self.time_budget
            )));
        }
        if !(self.memory_threshold > 0.0 && self.memory_threshold <= 1.0) {
            return Err(BatchError::config(format!(
                "memory threshold {} must be within (0, 1]",
                self.memory_threshold
            )));
        }
        if self.event_capacity == 0 {
            return Err(BatchError::config("event capacity must be positive"));
        }
        if self.nonce_secret.is_empty() {
            warn!("Nonce secret is empty; trigger requests are effectively unsigned");
        }
        Ok(self)
    }

    /// Pause age after which a health check resumes a timed pause
    pub fn pause_timeout(&self) -> Duration {
        self.health_check_interval / 2
    }

    pub fn with_host_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.host_prefix = prefix.into();
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_memory_ceiling(mut self, bytes: u64) -> Self {
        self.memory_ceiling = Some(bytes);
        self
    }

    pub fn with_multi_tenant(mut self, home_tenant: TenantScope) -> Self {
        self.multi_tenant = true;
        self.home_tenant = home_tenant;
        self
    }

    pub fn with_nonce_secret(mut self, secret: impl Into<String>) -> Self {
        self.nonce_secret = secret.into();
        self
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
