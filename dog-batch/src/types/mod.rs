pub mod batch;
pub mod events;
pub mod ids;
pub mod status;
pub mod task;
pub mod trigger;

pub use batch::{Batch, BatchItems, BatchRecord};
pub use events::BatchEvent;
pub use ids::{BatchKey, BatchScope, ChainId, QueueId, TenantScope};
pub use status::ProcessStatus;
pub use task::{Task, TaskOutcome};
pub use trigger::{DeclineReason, DrainCtx, DrainOutcome, TriggerRequest};
