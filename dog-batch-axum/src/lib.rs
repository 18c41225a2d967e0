//! dog-batch-axum: HTTP trigger endpoint for dog-batch.
//!
//! Mounts a POST route that verifies the trigger nonce, resolves the queue
//! from the `action` parameter, and starts a drain pass in the background.

mod error;
pub mod app;
pub mod state;
pub mod trigger;

pub use app::BatchApp;
pub use error::TriggerError;
pub use state::TriggerState;
pub use trigger::{tenant_from_headers, trigger_router, TriggerQuery};

pub use axum;
