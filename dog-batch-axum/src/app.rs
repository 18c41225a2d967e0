use std::sync::Arc;

use axum::Router;
use dog_batch::{BackgroundProcess, BatchResult, EngineRegistry};
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::trigger_router;

/// Registry plus the router that serves its trigger endpoint
pub struct BatchApp {
    pub registry: Arc<EngineRegistry>,
    pub router: Router<()>,
}

impl Clone for BatchApp {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            router: self.router.clone(),
        }
    }
}

impl BatchApp {
    /// Mount the trigger endpoint at `path`
    pub fn new(registry: Arc<EngineRegistry>, path: &str) -> Self {
        let trigger = trigger_router(Arc::clone(&registry));
        let router = if path.is_empty() || path == "/" {
            trigger
        } else {
            Router::new().nest(path, trigger)
        };
        Self { registry, router }
    }

    pub fn register(self, engine: Arc<dyn BackgroundProcess>) -> BatchResult<Self> {
        self.registry.register(engine)?;
        Ok(self)
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "Trigger endpoint listening");
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}
