use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Circuit breaker type guarding the consultation store.
pub type StoreCircuitBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Breaker shared by every consultation store query.
///
/// Opens after 5 consecutive database errors. While open, saves fail with
/// `StoreUnavailable` and the webhook answers 500, so the provider redelivers
/// later. The retry window starts at 10s and doubles up to 60s.
pub fn create_db_circuit_breaker() -> StoreCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
