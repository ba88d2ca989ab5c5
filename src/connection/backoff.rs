//! Exponential backoff schedule for reconnect attempts

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

/// Upper bound (exclusive) of the random jitter added to each delay, in nanoseconds
const JITTER_CEILING_NANOS: u64 = 1_000_000_000;

/// Compute the delay before the given reconnect attempt.
///
/// The schedule is `min(base_delay * 2^attempt, max_delay)` plus a random
/// jitter in `[0, 1s)` so many clients recovering from the same outage do
/// not retry in lockstep.
#[must_use]
pub fn delay_for_attempt(policy: &ReconnectConfig, attempt: u32) -> Duration {
    let jitter_nanos = rand::thread_rng().gen_range(0..JITTER_CEILING_NANOS);
    base_delay_for_attempt(policy, attempt) + Duration::from_nanos(jitter_nanos)
}

/// The deterministic part of the schedule, before jitter
#[must_use]
pub fn base_delay_for_attempt(policy: &ReconnectConfig, attempt: u32) -> Duration {
    policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(policy.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectConfig {
        ReconnectConfig {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            ..ReconnectConfig::default()
        }
    }

    #[test]
    fn doubles_until_cap() {
        let policy = policy();
        assert_eq!(base_delay_for_attempt(&policy, 0), Duration::from_secs(1));
        assert_eq!(base_delay_for_attempt(&policy, 1), Duration::from_secs(2));
        assert_eq!(base_delay_for_attempt(&policy, 2), Duration::from_secs(4));
        assert_eq!(base_delay_for_attempt(&policy, 4), Duration::from_secs(16));
        assert_eq!(base_delay_for_attempt(&policy, 5), Duration::from_secs(30));
        assert_eq!(base_delay_for_attempt(&policy, 6), Duration::from_secs(30));
    }

    #[test]
    fn monotone_non_decreasing() {
        let policy = policy();
        let mut previous = Duration::ZERO;
        for attempt in 0..20 {
            let delay = base_delay_for_attempt(&policy, attempt);
            assert!(delay >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
            previous = delay;
        }
    }

    #[test]
    fn no_overflow_at_extreme_attempts() {
        let policy = policy();
        assert_eq!(
            base_delay_for_attempt(&policy, u32::MAX),
            policy.max_delay
        );
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = policy();
        for attempt in 0..8 {
            for _ in 0..50 {
                let delay = delay_for_attempt(&policy, attempt);
                let base = base_delay_for_attempt(&policy, attempt);
                assert!(delay >= base, "below base: {delay:?}");
                assert!(
                    delay < base + Duration::from_secs(1),
                    "jitter out of range: {delay:?}"
                );
                assert!(delay < policy.max_delay + Duration::from_secs(1));
            }
        }
    }
}
