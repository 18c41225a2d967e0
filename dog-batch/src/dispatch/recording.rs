use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{dispatch::Dispatcher, types::TriggerRequest, BatchError, BatchResult};

/// Dispatcher that keeps every trigger in memory instead of sending it.
///
/// Hosts that drive workers themselves drain the recorded requests with [`take`](Self::take).
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    requests: Arc<Mutex<Vec<TriggerRequest>>>,
    failing: bool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher whose every dispatch fails, for transport-failure paths
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Snapshot of recorded requests
    pub fn requests(&self) -> Vec<TriggerRequest> {
        self.requests.lock().clone()
    }

    /// Remove and return recorded requests
    pub fn take(&self) -> Vec<TriggerRequest> {
        std::mem::take(&mut *self.requests.lock())
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: TriggerRequest) -> BatchResult<()> {
        if self.failing {
            return Err(BatchError::DispatchFailed(format!(
                "connection refused for {}",
                request.action
            )));
        }
        self.requests.lock().push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChainId, QueueId, TenantScope};
    use tokio_test::{assert_err, assert_ok, block_on};

    fn request(action: &str) -> TriggerRequest {
        TriggerRequest {
            action: QueueId::from(action),
            nonce: "n".to_string(),
            chain_id: ChainId::new(),
            tenant: TenantScope::default(),
            context: Default::default(),
        }
    }

    #[test]
    fn records_until_taken() {
        let dispatcher = RecordingDispatcher::new();
        assert_ok!(block_on(dispatcher.dispatch(request("app_a"))));
        assert_ok!(block_on(dispatcher.dispatch(request("app_b"))));
        assert_eq!(dispatcher.len(), 2);

        let taken = dispatcher.take();
        assert_eq!(taken[0].action.as_str(), "app_a");
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn failing_dispatcher_records_nothing() {
        let dispatcher = RecordingDispatcher::failing();
        assert_err!(block_on(dispatcher.dispatch(request("app_a"))));
        assert!(dispatcher.requests().is_empty());
    }
}
