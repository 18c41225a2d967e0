use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    dispatch::{Dispatcher, TENANT_HEADER},
    types::TriggerRequest,
    BatchError, BatchResult,
};

/// Fire-and-forget HTTP POST to the trigger endpoint
#[derive(Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDispatcher {
    /// Create a dispatcher whose requests give up after `timeout`
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> BatchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BatchError::DispatchFailed(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, request: TriggerRequest) -> BatchResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BatchError::DispatchFailed(format!("no runtime: {e}")))?;

        let call = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("action", request.action.as_str()),
                ("nonce", request.nonce.as_str()),
                ("chain_id", request.chain_id.as_str()),
            ])
            .header(TENANT_HEADER, request.tenant.as_str())
            .json(&request.context);

        let queue_id = request.action;
        let chain_id = request.chain_id;
        runtime.spawn(async move {
            match call.send().await {
                Ok(response) => {
                    debug!(%queue_id, %chain_id, status = %response.status(), "Trigger delivered");
                }
                // The worker keeps running after we stop listening.
                Err(e) if e.is_timeout() => {
                    debug!(%queue_id, %chain_id, "Trigger sent, response not awaited");
                }
                Err(e) => {
                    warn!(%queue_id, %chain_id, error = %e, "Trigger dispatch failed");
                }
            }
        });

        Ok(())
    }
}
