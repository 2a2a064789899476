//! Retry policy with exponential backoff for failed reconciliations
//!
//! Errors are classified as transient or permanent. Transient errors are retried
//! on an exponential schedule that settles at one hour and never gives up,
//! permanent ones wait for the object to change.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use kube::runtime::controller::Action;
use tracing::{debug, warn};

/// Base delay for exponential backoff (seconds)
const BASE_DELAY_SECS: u64 = 5;

/// Maximum delay between retries (1 hour)
const MAX_DELAY_SECS: u64 = 3600;

/// Tracks consecutive failures per object key.
///
/// The error policy of the runtime is synchronous, so the map sits behind a
/// blocking mutex that is never held across an await point.
#[derive(Debug, Default)]
pub struct RetryTracker {
    attempts: Mutex<HashMap<String, u32>>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the failure count for a key and return the new count
    pub fn increment(&self, key: &str) -> u32 {
        let mut attempts = self
            .attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = attempts.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Forget a key after a successful pass
    pub fn reset(&self, key: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
    }

    pub fn get(&self, key: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Store failures, dependencies that are not ready yet
    Transient,
    /// Invalid owner identity or documents, nothing changes without an edit
    Permanent,
}

/// Delay before the given attempt: 5s, 10s, 20s, ... capped at one hour.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let delay_secs = BASE_DELAY_SECS.saturating_mul(2u64.pow(exponent));
    Duration::from_secs(delay_secs.min(MAX_DELAY_SECS))
}

pub fn compute_backoff(attempt: u32, kind: ErrorKind) -> Action {
    match kind {
        ErrorKind::Transient => {
            let delay = backoff_delay(attempt);
            debug!(
                attempt,
                delay_secs = delay.as_secs(),
                "scheduling retry with exponential backoff"
            );
            Action::requeue(delay)
        }
        ErrorKind::Permanent => {
            warn!("permanent error, waiting for resource change");
            Action::await_change()
        }
    }
}
