use std::sync::Arc;

use dog_batch::EngineRegistry;

pub struct TriggerState {
    pub registry: Arc<EngineRegistry>,
}

impl Clone for TriggerState {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl TriggerState {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self { registry }
    }
}
