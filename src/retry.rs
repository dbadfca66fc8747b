//! Shared retry policy for external calls.
//!
//! Every wrapper around a flaky collaborator (LLM, advanced search provider)
//! goes through [`RetryPolicy::run`] instead of growing its own loop.

use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SynthesisError;

/// Errors that can tell whether another attempt might succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for SynthesisError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            SynthesisError::RateLimited
                | SynthesisError::Timeout
                | SynthesisError::Server { .. }
                | SynthesisError::Connection { .. }
                | SynthesisError::Empty
        )
    }
}

/// Max attempts plus an exponential backoff schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1` (0-based attempt that just failed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_backoff_ms as f64) as u64;
        let ms = if self.jitter {
            let jitter = (capped as f64 * 0.25 * rand::thread_rng().gen::<f64>()) as u64;
            capped + jitter
        } else {
            capped
        };
        Duration::from_millis(ms)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    /// Blocks the calling thread between attempts.
    pub fn run<T, E, F>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_retryable() || attempt + 1 >= attempts {
                        return Err(e);
                    }
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        call = label,
                        attempt = attempt + 1,
                        max = attempts,
                        backoff_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
