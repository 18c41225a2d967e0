use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::BatchResult;

/// One unit of work inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task<P> {
    /// Opaque payload handed to the executor
    pub payload: P,

    /// Processing attempts so far, present only when the executor tracks attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl<P> Task<P> {
    /// Create a task without attempt tracking
    pub fn new(payload: P) -> Self {
        Self { payload, attempts: None }
    }

    /// Create a task that starts counting attempts from zero
    pub fn tracked(payload: P) -> Self {
        Self { payload, attempts: Some(0) }
    }

    /// Attempts so far, zero when untracked
    pub fn attempt_count(&self) -> u32 {
        self.attempts.unwrap_or(0)
    }

    /// Whether attempts are counted for this task
    pub fn is_tracked(&self) -> bool {
        self.attempts.is_some()
    }
}

impl Task<Value> {
    /// Decode the stored payload into the executor's type
    pub fn decode<P: DeserializeOwned>(&self) -> BatchResult<Task<P>> {
        Ok(Task {
            payload: serde_json::from_value(self.payload.clone())?,
            attempts: self.attempts,
        })
    }
}

impl<P: Serialize> Task<P> {
    /// Encode the payload for storage
    pub fn encode(&self) -> BatchResult<Task<Value>> {
        Ok(Task {
            payload: serde_json::to_value(&self.payload)?,
            attempts: self.attempts,
        })
    }
}

/// What the executor decided about a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<P> {
    /// The task is finished (or permanently failed) and leaves the batch
    Drop,

    /// The task stays in its slot, possibly mutated, to be run again later
    Keep(Task<P>),
}

impl<P> TaskOutcome<P> {
    pub fn is_drop(&self) -> bool {
        matches!(self, Self::Drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untracked_tasks_omit_attempts_when_stored() {
        let stored = serde_json::to_value(Task::new(json!({"id": 1}))).unwrap();
        assert_eq!(stored, json!({"payload": {"id": 1}}));

        let tracked = serde_json::to_value(Task::tracked(json!(5))).unwrap();
        assert_eq!(tracked, json!({"payload": 5, "attempts": 0}));
    }

    #[test]
    fn decode_keeps_attempt_counter() {
        let stored = Task { payload: json!("mail"), attempts: Some(2) };
        let decoded: Task<String> = stored.decode().unwrap();
        assert_eq!(decoded.payload, "mail");
        assert_eq!(decoded.attempt_count(), 2);
    }
}
