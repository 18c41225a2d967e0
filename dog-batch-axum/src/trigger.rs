use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing, Json, Router,
};
use dog_batch::{
    BatchError, ChainId, EngineRegistry, QueueId, TenantScope, TriggerRequest, TENANT_HEADER,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::{TriggerError, TriggerState};

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerQuery {
    pub action: String,
    pub nonce: String,
    #[serde(default)]
    pub chain_id: Option<String>,
}

pub fn tenant_from_headers(headers: &HeaderMap) -> Option<TenantScope> {
    headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(TenantScope::new)
}

fn parse_context(body: &Bytes) -> Result<HashMap<String, String>, TriggerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(HashMap::new());
    }
    serde_json::from_slice(body)
        .map_err(|e| TriggerError(BatchError::SerializationError(e.to_string())))
}

/// Router answering trigger POSTs for every registered engine.
///
/// The drain runs on a spawned task; the dispatcher disconnects after a few
/// milliseconds and the response only acknowledges acceptance.
pub fn trigger_router(registry: Arc<EngineRegistry>) -> Router {
    let state = TriggerState::new(registry);

    Router::new()
        .route(
            "/",
            routing::post(
                move |State(state): State<TriggerState>,
                      headers: HeaderMap,
                      Query(query): Query<TriggerQuery>,
                      body: Bytes| async move {
                    let action = QueueId::from(query.action.as_str());
                    let engine = state.registry.get(&action).map_err(TriggerError)?;

                    if !engine.verify_nonce(&query.nonce) {
                        warn!(queue_id = %action, "Rejected trigger with invalid nonce");
                        return Err(TriggerError(BatchError::InvalidNonce));
                    }

                    let context = parse_context(&body)?;
                    let tenant = tenant_from_headers(&headers)
                        .unwrap_or_else(|| engine.home_tenant().clone());
                    let chain_id = query
                        .chain_id
                        .filter(|c| !c.is_empty())
                        .map(ChainId::from_string)
                        .unwrap_or_default();

                    let request = TriggerRequest {
                        action: action.clone(),
                        nonce: query.nonce,
                        chain_id: chain_id.clone(),
                        tenant,
                        context,
                    };

                    tokio::spawn(async move {
                        match engine.handle_trigger(request).await {
                            Ok(outcome) => {
                                debug!(queue_id = %engine.queue_id(), outcome = outcome.name(), "Trigger handled")
                            }
                            Err(e) => {
                                warn!(queue_id = %engine.queue_id(), error = %e, "Trigger drain failed")
                            }
                        }
                    });

                    Ok::<_, TriggerError>((
                        StatusCode::ACCEPTED,
                        Json(json!({
                            "accepted": true,
                            "queue": action.as_str(),
                            "chain_id": chain_id.as_str(),
                        })),
                    )
                        .into_response())
                },
            ),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
