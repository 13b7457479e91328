//! Retry configuration and backoff calculation.
//!
//! Portable, sync-only building blocks: the async retry loops live next to
//! the provider calls. The backoff formula is
//! `min(base · 2^attempt + jitter, max)` with `attempt` counted from 1.

use serde::{Deserialize, Serialize};

/// Default maximum attempts per chunk.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
/// Default jitter range in milliseconds.
pub const DEFAULT_JITTER_MS: u64 = 1000;

/// Configuration for retry logic.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (default: 5).
    pub max_attempts: u32,
    /// Base delay for exponential backoff in ms (default: 1000).
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in ms (default: 60000).
    pub max_delay_ms: u64,
    /// Additive jitter range in ms (default: 1000).
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_ms: DEFAULT_JITTER_MS,
        }
    }
}

impl RetryConfig {
    /// Backoff delay in ms for a 1-based attempt number.
    ///
    /// `random` must be in `[0.0, 1.0)`; it scales the additive jitter so
    /// concurrent retries do not synchronize.
    #[must_use]
    pub fn delay_ms(&self, attempt: u32, random: f64) -> u64 {
        let exponential = self.base_delay_ms.saturating_mul(1u64 << attempt.min(31));
        let jitter = (self.jitter_ms as f64 * random) as u64;
        exponential.saturating_add(jitter).min(self.max_delay_ms)
    }
}
