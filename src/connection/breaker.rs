//! Circuit breaker for connection attempts
//!
//! Distinct from backoff: once too many consecutive attempts fail, further
//! attempts are suppressed entirely for a cooldown window so the remote
//! endpoint is not hammered during an extended outage.

use std::time::{Duration, Instant};

/// Tracks consecutive connection failures and suppresses attempts while open.
///
/// All methods take the current [`Instant`] so the breaker can be driven by
/// a test clock.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a closed breaker
    #[must_use]
    pub const fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    /// Whether a connection attempt is currently allowed.
    ///
    /// While open, returns `false` until the cooldown has elapsed; the
    /// first call after the cooldown closes the breaker again so exactly
    /// one attempt goes through immediately.
    pub fn attempt_allowed(&mut self, now: Instant) -> bool {
        match self.opened_at {
            None => true,
            Some(opened) if now.duration_since(opened) >= self.cooldown => {
                tracing::info!("circuit breaker cooldown elapsed, closing");
                self.opened_at = None;
                self.consecutive_failures = 0;
                true
            }
            Some(_) => false,
        }
    }

    /// Record a failed connection attempt; opens the breaker at the threshold
    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        if self.opened_at.is_none() && self.consecutive_failures >= self.threshold {
            tracing::warn!(
                failures = self.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "circuit breaker open"
            );
            self.opened_at = Some(now);
        }
    }

    /// Record a successful connection; resets the failure counter
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    /// Number of consecutive failures recorded since the last success
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether the breaker is currently open
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }
}
