use thiserror::Error;

/// Result type for batch engine operations
pub type BatchResult<T> = Result<T, BatchError>;

/// Infrastructure errors for batch processing
#[derive(Error, Debug, Clone)]
pub enum BatchError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Queue not registered: {0}")]
    QueueNotRegistered(String),

    #[error("Queue already registered: {0}")]
    QueueAlreadyRegistered(String),

    #[error("Invalid or expired nonce")]
    InvalidNonce,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BatchError {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether the error was caused by the caller rather than infrastructure
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidNonce | Self::QueueNotRegistered(_) | Self::InvalidConfig(_)
        )
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
