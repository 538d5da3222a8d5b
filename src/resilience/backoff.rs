//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Delay policy for consecutive accept failures.
///
/// Typical causes are descriptor exhaustion (`EMFILE`) or a connection reset
/// before accept completed.
#[derive(Debug, Clone)]
pub struct AcceptBackoff {
    consecutive_failures: u32,
    base_ms: u64,
    max_ms: u64,
}

impl AcceptBackoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            consecutive_failures: 0,
            base_ms,
            max_ms,
        }
    }

    /// Register a failure and return how long to pause.
    pub fn next_delay(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        calculate_backoff(self.consecutive_failures, self.base_ms, self.max_ms)
    }

    /// Forget previous failures after a successful accept.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self::new(5, 1000)
    }
}
