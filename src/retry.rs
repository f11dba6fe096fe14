//! Bounded retry with exponential backoff for transient provider faults.
//!
//! Only [`ProviderError::Transient`] is retried. A permanent fault, or a
//! transient one that outlives `max_attempts` retries, is returned unchanged so
//! the caller can attribute it to the chapter it was working on.
//!
//! ```text
//! attempt 0 ──fail──▶ sleep d ──▶ attempt 1 ──fail──▶ sleep d·m ──▶ … ──▶ give up
//!                     (d ≤ max_delay, jitter adds 0..100% when enabled)
//! ```

use crate::provider::ProviderError;
use rand::Rng;
use std::thread;
use std::time::Duration;

/// Backoff parameters, resolved from the `[retry]` config section.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Out-of-range products (overflow, NaN) saturate at `max_delay`.
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff_multiplier)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of retries.
///
/// Blocks the calling thread while backing off; callers run this on a worker
/// thread, never on the thread that drains progress events.
pub fn with_retry<T, F>(policy: &RetryPolicy, mut operation: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Result<T, ProviderError>,
{
    let mut attempt = 0;
    let mut delay = policy.initial_delay.min(policy.max_delay);

    loop {
        match operation() {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                attempt += 1;
                let wait = if policy.jitter { add_jitter(delay) } else { delay };
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    "transient fault, retrying"
                );
                thread::sleep(wait);
                delay = policy.next_delay(delay);
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(error = %e, attempts = attempt + 1, "retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

/// Stretch `delay` by a uniform 0..=100% so parallel workers that failed
/// together don't retry together.
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + factor)).unwrap_or(delay)
}
