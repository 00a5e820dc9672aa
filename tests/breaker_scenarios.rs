use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use scribe_guard::{
    BreakerError, CircuitBreaker, CircuitBreakerOptions, CircuitState, create_circuit_breaker,
};
use tokio::sync::Barrier;
use tokio::time::{Instant, sleep};

#[derive(Debug, PartialEq)]
struct ProviderDown;

fn breaker(failures: u32, successes: u32, timeout_ms: u64, window_ms: u64) -> CircuitBreaker {
    create_circuit_breaker(
        "ai-provider",
        CircuitBreakerOptions {
            failure_threshold: Some(failures),
            success_threshold: Some(successes),
            timeout: Some(Duration::from_millis(timeout_ms)),
            window_size: Some(Duration::from_millis(window_ms)),
        },
    )
}

async fn fail(cb: &CircuitBreaker) -> BreakerError<ProviderDown> {
    cb.execute(|| async { Err::<(), _>(ProviderDown) })
        .await
        .expect_err("operation fails")
}

async fn succeed(cb: &CircuitBreaker) -> Result<u32, BreakerError<ProviderDown>> {
    cb.execute(|| async { Ok(7) }).await
}

#[tokio::test(start_paused = true)]
async fn threshold_failures_open_the_circuit() {
    let cb = breaker(3, 2, 100, 1000);
    let before = Instant::now();

    for _ in 0..3 {
        assert!(matches!(fail(&cb).await, BreakerError::Operation(ProviderDown)));
    }

    let stats = cb.stats();
    assert_eq!(stats.state, CircuitState::Open);
    assert_eq!(stats.failures, 3);
    let opened_at = stats.opened_at.expect("opened_at set");
    assert!(opened_at >= before && opened_at <= Instant::now());
}

#[tokio::test(start_paused = true)]
async fn open_circuit_rejects_without_calling() {
    let cb = breaker(2, 1, 100, 1000);
    fail(&cb).await;
    fail(&cb).await;

    let counter = AtomicUsize::new(0);
    let calls = &counter;
    for _ in 0..10 {
        let err = cb
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ProviderDown>(())
            })
            .await
            .expect_err("circuit open");
        assert!(err.is_open());
        sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn trial_call_after_timeout_stays_half_open_until_enough_successes() {
    let cb = breaker(1, 3, 100, 1000);
    fail(&cb).await;
    sleep(Duration::from_millis(100)).await;

    assert_eq!(succeed(&cb).await.unwrap(), 7);
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    assert_eq!(cb.stats().successes, 1);

    succeed(&cb).await.unwrap();
    assert_eq!(cb.state(), CircuitState::HalfOpen);

    succeed(&cb).await.unwrap();
    let stats = cb.stats();
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.successes, 0);
    assert!(stats.opened_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn half_open_failure_reopens_with_new_timestamp() {
    let cb = breaker(1, 2, 100, 1000);
    fail(&cb).await;
    let first = cb.stats().opened_at.expect("open");

    sleep(Duration::from_millis(150)).await;
    succeed(&cb).await.unwrap();
    assert_eq!(cb.state(), CircuitState::HalfOpen);

    assert!(matches!(fail(&cb).await, BreakerError::Operation(ProviderDown)));
    let stats = cb.stats();
    assert_eq!(stats.state, CircuitState::Open);
    assert_eq!(stats.successes, 0);
    assert!(stats.opened_at.expect("reopened") > first);

    // novo timeout conta a partir da reabertura
    let err = succeed(&cb).await.unwrap_err();
    let next = err.open_error().expect("open error").next_attempt_at;
    assert_eq!(next, stats.opened_at.unwrap() + Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn failures_outside_window_are_ignored() {
    let cb = breaker(3, 1, 100, 100);
    fail(&cb).await;
    fail(&cb).await;

    sleep(Duration::from_millis(150)).await;
    fail(&cb).await;
    fail(&cb).await;

    let stats = cb.stats();
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.failures, 2);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(cb.stats().failures, 0);
}

#[tokio::test(start_paused = true)]
async fn failure_exactly_window_old_still_counts() {
    let cb = breaker(3, 1, 100, 100);
    fail(&cb).await;

    sleep(Duration::from_millis(100)).await;
    assert_eq!(cb.stats().failures, 1);

    sleep(Duration::from_millis(1)).await;
    assert_eq!(cb.stats().failures, 0);
}

#[tokio::test(start_paused = true)]
async fn reset_from_every_state() {
    let cb = breaker(1, 2, 100, 1000);

    // OPEN
    fail(&cb).await;
    cb.reset();
    assert_eq!(cb.state(), CircuitState::Closed);

    // HALF_OPEN
    fail(&cb).await;
    sleep(Duration::from_millis(100)).await;
    succeed(&cb).await.unwrap();
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    cb.reset();

    let stats = cb.stats();
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.successes, 0);
    assert!(stats.opened_at.is_none());
    assert!(stats.last_failure.is_none());
    assert!(stats.last_success.is_none());
}

#[tokio::test(start_paused = true)]
async fn full_recovery_cycle() {
    let cb = breaker(3, 2, 100, 1000);

    for _ in 0..3 {
        fail(&cb).await;
    }
    assert_eq!(cb.state(), CircuitState::Open);
    let opened_at = cb.stats().opened_at.unwrap();

    let err = succeed(&cb).await.unwrap_err();
    let open = err.open_error().expect("circuit open");
    assert_eq!(open.breaker, "ai-provider");
    assert_eq!(open.next_attempt_at, opened_at + Duration::from_millis(100));
    assert_eq!(open.retry_after(), Duration::from_millis(100));

    sleep(Duration::from_millis(150)).await;
    succeed(&cb).await.unwrap();
    assert_eq!(cb.state(), CircuitState::HalfOpen);

    succeed(&cb).await.unwrap();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.stats().failures, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failures_are_counted_exactly() {
    let cb = Arc::new(breaker(3, 2, 60_000, 60_000));
    let gate = Arc::new(Barrier::new(3));

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let cb = Arc::clone(&cb);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                cb.execute(|| async move {
                    // todos admitidos antes de qualquer falha
                    gate.wait().await;
                    Err::<(), _>(ProviderDown)
                })
                .await
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        let err = result.expect("task").expect_err("operation fails");
        assert!(matches!(err, BreakerError::Operation(ProviderDown)));
    }

    let stats = cb.stats();
    assert_eq!(stats.state, CircuitState::Open);
    assert_eq!(stats.failures, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_while_open_never_slip_through() {
    let cb = Arc::new(breaker(1, 1, 60_000, 60_000));
    fail(&cb).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let cb = Arc::clone(&cb);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cb.execute(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ProviderDown>(())
                })
                .await
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        assert!(result.expect("task").unwrap_err().is_open());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(cb.state(), CircuitState::Open);
}
