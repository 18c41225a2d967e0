use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dog_batch::BatchError;
use serde_json::json;

#[derive(Debug)]
pub struct TriggerError(pub BatchError);

impl From<BatchError> for TriggerError {
    fn from(e: BatchError) -> Self {
        Self(e)
    }
}

impl TriggerError {
    fn kind(&self) -> (StatusCode, &'static str, &'static str) {
        match &self.0 {
            BatchError::QueueNotRegistered(_) => (StatusCode::NOT_FOUND, "NotFound", "not-found"),
            BatchError::InvalidNonce => (StatusCode::FORBIDDEN, "Forbidden", "forbidden"),
            BatchError::SerializationError(_) | BatchError::InvalidConfig(_) => {
                (StatusCode::BAD_REQUEST, "BadRequest", "bad-request")
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "GeneralError",
                "general-error",
            ),
        }
    }
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        let (status, name, class_name) = self.kind();

        // Infrastructure details stay in the logs
        let message = if status.is_server_error() {
            tracing::error!(error = %self.0, "Trigger request failed");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };

        let body = json!({
            "name": name,
            "message": message,
            "code": status.as_u16(),
            "className": class_name,
        });
        (status, Json(body)).into_response()
    }
}
