use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::types::QueueId;

/// Signs and verifies short-lived trigger nonces.
///
/// A nonce is valid for the tick it was minted in and the one after, where a tick is
/// half the configured lifetime.
#[derive(Clone)]
pub struct NonceSigner {
    secret: String,
    lifetime: Duration,
}

impl NonceSigner {
    pub fn new(secret: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            secret: secret.into(),
            lifetime: lifetime.max(Duration::from_secs(2)),
        }
    }

    /// Mint a nonce for `queue_id`
    pub fn sign(&self, queue_id: &QueueId) -> String {
        self.digest(queue_id, self.current_tick())
    }

    /// Check a nonce minted for `queue_id`
    pub fn verify(&self, queue_id: &QueueId, nonce: &str) -> bool {
        let tick = self.current_tick();
        [tick, tick.saturating_sub(1)]
            .iter()
            .any(|t| constant_time_eq(self.digest(queue_id, *t).as_bytes(), nonce.as_bytes()))
    }

    fn current_tick(&self) -> u64 {
        let half_life = (self.lifetime.as_secs() / 2).max(1);
        Utc::now().timestamp().max(0) as u64 / half_life
    }

    fn digest(&self, queue_id: &QueueId, tick: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b"|");
        hasher.update(queue_id.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(tick.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
