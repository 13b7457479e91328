//! Circuit breaker guarding the transcription provider.
//!
//! One instance lives for the whole process and is shared by every
//! orchestrator invocation, so a provider outage discovered by one job
//! short-circuits the others.
//!
//! State machine: `Closed` → `Open` once the consecutive-failure counter
//! reaches the threshold; `Open` → `HalfOpen` after the cooldown elapses
//! since the last recorded failure; any success resets to `Closed`; a
//! failure while `HalfOpen` reopens and restarts the cooldown. While open,
//! calls fail immediately without contacting the provider.
//!
//! Methods take `now` explicitly so tests control the clock. Mutations run
//! entirely inside the lock — never across an await point.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::ProviderError;

/// Breaker tuning.
#[derive(Clone, Copy, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens (default 5).
    pub failure_threshold: u32,
    /// Cooldown before an open breaker allows a probe (default 300 s).
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(300),
        }
    }
}

/// Breaker states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation.
    Closed,
    /// Failing fast; the provider is not contacted.
    Open,
    /// Cooldown elapsed; the next call probes the provider.
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    failures: u32,
    last_failure: Option<Instant>,
}

/// Shared circuit breaker.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a breaker in the closed state.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                last_failure: None,
            }),
        }
    }

    /// Gate a provider call at time `now`.
    ///
    /// Transitions `Open` → `HalfOpen` when the cooldown has elapsed;
    /// otherwise an open breaker fails fast with
    /// [`ProviderError::CircuitOpen`].
    pub fn check(&self, now: Instant) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Open {
            return Ok(());
        }
        let elapsed = inner
            .last_failure
            .map(|at| now.duration_since(at))
            .unwrap_or(Duration::MAX);
        if elapsed >= self.config.cooldown {
            inner.state = BreakerState::HalfOpen;
            info!("circuit breaker entering half-open probe");
            Ok(())
        } else {
            Err(ProviderError::CircuitOpen)
        }
    }

    /// Record a successful provider call: counter reset, state closed.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.failures = 0;
        inner.state = BreakerState::Closed;
    }

    /// Record a failed provider call at time `now`.
    pub fn record_failure(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.failures += 1;
        inner.last_failure = Some(now);
        let opening = inner.state == BreakerState::HalfOpen
            || inner.failures >= self.config.failure_threshold;
        if opening && inner.state != BreakerState::Open {
            inner.state = BreakerState::Open;
            warn!(failures = inner.failures, "circuit breaker opened");
        }
    }

    /// Current state (as last transitioned).
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Current consecutive-failure count.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.inner.lock().failures
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 5,
            cooldown: Duration::from_secs(300),
        })
    }

    #[test]
    fn starts_closed() {
        let b = breaker();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.check(Instant::now()).is_ok());
    }

    #[test]
    fn opens_after_five_consecutive_failures() {
        let b = breaker();
        let now = Instant::now();
        for _ in 0..4 {
            b.record_failure(now);
            assert_eq!(b.state(), BreakerState::Closed);
        }
        b.record_failure(now);
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn open_breaker_fails_fast_before_cooldown() {
        let b = breaker();
        let now = Instant::now();
        for _ in 0..5 {
            b.record_failure(now);
        }
        let soon = now + Duration::from_secs(10);
        assert!(matches!(b.check(soon), Err(ProviderError::CircuitOpen)));
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn half_open_after_cooldown_then_success_closes() {
        let b = breaker();
        let now = Instant::now();
        for _ in 0..5 {
            b.record_failure(now);
        }
        let later = now + Duration::from_secs(301);
        assert!(b.check(later).is_ok());
        assert_eq!(b.state(), BreakerState::HalfOpen);

        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.failures(), 0);
    }

    #[test]
    fn failure_while_half_open_reopens() {
        let b = breaker();
        let now = Instant::now();
        for _ in 0..5 {
            b.record_failure(now);
        }
        let later = now + Duration::from_secs(301);
        assert!(b.check(later).is_ok());

        b.record_failure(later);
        assert_eq!(b.state(), BreakerState::Open);

        // Cooldown restarted from the half-open failure.
        assert!(matches!(
            b.check(later + Duration::from_secs(200)),
            Err(ProviderError::CircuitOpen)
        ));
        assert!(b.check(later + Duration::from_secs(301)).is_ok());
    }

    #[test]
    fn success_resets_counter_mid_streak() {
        let b = breaker();
        let now = Instant::now();
        for _ in 0..4 {
            b.record_failure(now);
        }
        b.record_success();
        assert_eq!(b.failures(), 0);

        // A fresh streak is needed to open.
        for _ in 0..4 {
            b.record_failure(now);
        }
        assert_eq!(b.state(), BreakerState::Closed);
    }
}
