#[cfg(feature = "http")]
pub mod http;
pub mod nonce;
pub mod recording;

use async_trait::async_trait;

use crate::{types::TriggerRequest, BatchResult};

#[cfg(feature = "http")]
pub use http::HttpDispatcher;
pub use nonce::NonceSigner;
pub use recording::RecordingDispatcher;

/// Header carrying the tenant scope of a trigger
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Transport that wakes a worker for a queue.
///
/// Implementations must not wait for the worker; a dispatch either hands the request
/// off or fails fast. Failures are logged by the caller and never abort a pass.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: TriggerRequest) -> BatchResult<()>;
}
