//! Connection policy integration tests
//!
//! Exercises the backoff schedule, circuit breaker, and manager surface
//! without a reachable endpoint.

use std::time::{Duration, Instant};

use secrecy::SecretString;
use tokio::sync::mpsc;

use aura_client::connection::{
    CircuitBreaker, ConnectionEvent, ConnectionManager, ConnectionState, base_delay_for_attempt,
    delay_for_attempt,
};
use aura_client::protocol::ClientPayload;
use aura_client::{Error, ReconnectConfig};

fn policy() -> ReconnectConfig {
    ReconnectConfig {
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
        max_attempts: 10,
        breaker_threshold: 3,
        breaker_cooldown: Duration::from_secs(60),
    }
}

fn manager() -> (
    std::sync::Arc<ConnectionManager>,
    mpsc::Receiver<ConnectionEvent>,
) {
    let (tx, rx) = mpsc::channel(32);
    let manager = ConnectionManager::new(
        "wss://aura.invalid/voice",
        SecretString::from("integration-token"),
        policy(),
        tx,
    );
    (manager, rx)
}

#[test]
fn test_backoff_is_monotone_up_to_the_cap() {
    let policy = policy();

    let mut previous = Duration::ZERO;
    for attempt in 0..32 {
        let delay = base_delay_for_attempt(&policy, attempt);
        assert!(delay >= previous, "attempt {attempt} regressed");
        assert!(delay <= policy.max_delay);
        previous = delay;
    }
}

#[test]
fn test_backoff_with_jitter_never_exceeds_cap_plus_one_second() {
    let policy = policy();

    for attempt in 0..16 {
        for _ in 0..100 {
            let delay = delay_for_attempt(&policy, attempt);
            assert!(
                delay < policy.max_delay + Duration::from_secs(1),
                "attempt {attempt}: {delay:?}"
            );
        }
    }
}

#[test]
fn test_five_failures_with_threshold_three_suppresses_the_tail() {
    let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60));
    let start = Instant::now();

    let mut attempted = 0;
    for _ in 0..5 {
        if breaker.attempt_allowed(start) {
            attempted += 1;
            breaker.record_failure(start);
        }
    }

    // Attempts 4 and 5 never reach the transport
    assert_eq!(attempted, 3);
    assert!(breaker.is_open());
}

#[test]
fn test_breaker_suppresses_for_the_full_cooldown() {
    let cooldown = Duration::from_secs(60);
    let mut breaker = CircuitBreaker::new(3, cooldown);
    let start = Instant::now();

    for _ in 0..3 {
        breaker.record_failure(start);
    }

    assert!(!breaker.attempt_allowed(start + Duration::from_millis(1)));
    assert!(!breaker.attempt_allowed(start + cooldown - Duration::from_millis(1)));

    // Exactly one attempt goes through once the cooldown elapses
    assert!(breaker.attempt_allowed(start + cooldown));
    assert!(!breaker.is_open());
}

#[tokio::test]
async fn test_send_without_transport_is_not_connected() {
    let (manager, _events) = manager();

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    let result = manager.send(ClientPayload::VoiceStart).await;
    assert!(matches!(result, Err(Error::NotConnected)));
}

#[tokio::test]
async fn test_disconnect_reports_a_clean_close() {
    let (manager, mut events) = manager();

    manager.disconnect().await;

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(
        events.recv().await,
        Some(ConnectionEvent::Disconnected { clean: true })
    );
}

#[tokio::test]
async fn test_state_subscription_sees_current_value() {
    let (manager, _events) = manager();
    let rx = manager.subscribe();
    assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
}
