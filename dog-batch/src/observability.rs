use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use crate::{backend::BoxStream, types::BatchEvent};

/// Broadcast channel for lifecycle events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BatchEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; having no subscribers is fine
    pub fn emit(&self, event: BatchEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.sender.subscribe()
    }

    /// Event stream that skips lagged notifications
    pub fn stream(&self) -> BoxStream<BatchEvent> {
        let stream = BroadcastStream::new(self.sender.subscribe()).filter_map(|result| result.ok());
        Box::pin(stream)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Install a `tracing` subscriber honouring `RUST_LOG`, falling back to `default_filter`
#[cfg(feature = "tracing-basic")]
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
