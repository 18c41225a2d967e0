//! # dog-batch: Durable Batch Processing for DogRS
//!
//! **At-least-once background batches with self-healing workers**
//!
//! dog-batch moves expensive multi-step work out of the request cycle. Producers
//! push tasks into an in-memory buffer and flush them as one durable batch; a
//! fire-and-forget trigger wakes a worker which drains batches under an advisory
//! lock, persisting progress after every task.
//!
//! ## Guarantees
//!
//! - **Single drainer**: a TTL-bounded process lock keeps one worker per queue
//! - **Durable progress**: a crash loses at most the task in flight
//! - **Self-healing**: a periodic health check restarts stuck or dropped chains
//! - **Bounded retries**: opt-in attempt counting with a pluggable limit
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dog_batch::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Notification {
//!     entry_id: u64,
//! }
//!
//! struct SendNotifications;
//!
//! #[async_trait]
//! impl TaskExecutor for SendNotifications {
//!     type Payload = Notification;
//!     const ACTION: &'static str = "send_notifications";
//!     const TRACK_ATTEMPTS: bool = true;
//!
//!     async fn task(&self, task: Task<Notification>) -> TaskOutcome<Notification> {
//!         match send(task.payload.entry_id).await {
//!             Ok(()) => TaskOutcome::Drop,
//!             Err(_) => TaskOutcome::Keep(task),
//!         }
//!     }
//! }
//!
//! let engine = BatchEngine::builder(SendNotifications, Arc::new(MemoryStore::new()))
//!     .config(BatchConfig::from_env("BATCH")?)
//!     .build()?;
//!
//! engine.push(Notification { entry_id: 7 })?.push(Notification { entry_id: 8 })?;
//! engine.save().await?;
//! engine.dispatch().await;
//! ```

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod executor;
pub mod lock;
pub mod observability;
pub mod policy;
pub mod queue;
pub mod registry;
pub mod resources;
pub mod scheduler;
pub mod status;
pub mod tenant;
pub mod types;

pub use backend::{BatchStore, FlagStore};
pub use config::BatchConfig;
pub use dispatch::{Dispatcher, NonceSigner, RecordingDispatcher, TENANT_HEADER};
pub use engine::{BatchEngine, BatchEngineBuilder};
pub use error::{BatchError, BatchResult};
pub use executor::TaskExecutor;
pub use policy::{ContinueCondition, EnginePolicies, FixedMaxAttempts, MaxAttemptsPolicy};
pub use registry::{BackgroundProcess, EngineRegistry};
pub use scheduler::{HealthScheduler, ManualScheduler, TokioScheduler};
pub use tenant::{SingleTenant, StaticTenants, TenantDirectory};
pub use types::{
    Batch, BatchEvent, BatchKey, BatchScope, ChainId, DeclineReason, DrainCtx, DrainOutcome, ProcessStatus,
    QueueId, Task, TaskOutcome, TenantScope, TriggerRequest,
};

#[cfg(feature = "memory")]
pub use backend::memory::MemoryStore;

#[cfg(feature = "http")]
pub use dispatch::HttpDispatcher;

/// Prelude for hosts defining and running batch queues
pub mod prelude {
    pub use crate::{
        BackgroundProcess, BatchConfig, BatchEngine, BatchError, BatchResult, DrainOutcome,
        EngineRegistry, ProcessStatus, Task, TaskExecutor, TaskOutcome, TenantScope,
    };

    #[cfg(feature = "memory")]
    pub use crate::MemoryStore;

    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
