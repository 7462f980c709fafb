//! # Rate Limiter
//! Per-key minimum-interval throttle used to pace calls to the content source.
//!
//! `acquire(key)` waits until at least `min_interval` has passed since the
//! previous `acquire` with the same key, then records the new timestamp.
//! Keys never block each other; calls sharing a key are serialized on that
//! key's own lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

/// Key used when a call is not attributed to a particular user.
pub const GLOBAL_KEY: &str = "__global__";

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

type Slot = Arc<AsyncMutex<Option<Instant>>>;

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for the key's slot, then stamp it.
    pub async fn acquire(&self, key: &str) {
        let slot = self.slot(key);
        let mut last = slot.lock().await;

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(target: "ingest", key, wait_ms = wait.as_millis() as u64, "rate limiting");
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }

    /// Number of distinct keys seen so far.
    pub fn key_count(&self) -> usize {
        self.slots.lock().expect("rate limiter mutex poisoned").len()
    }

    // The map lock is held only long enough to fetch or insert the slot.
    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().expect("rate limiter mutex poisoned");
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }
}
