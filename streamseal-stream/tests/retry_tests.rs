//! Bounded retry driver tests.

mod support;

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use streamseal_stream::retry::{RetryDecision, RetryOutcome, RetryPolicy, retry_bounded};
use support::ManualTimer;

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(3_000))
}

fn always_retry(_: &&str) -> RetryDecision {
    RetryDecision::Retry
}

#[test]
fn policy_clamps_zero_attempts() {
    assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
}

#[test]
fn default_policy_is_ten_attempts_three_seconds() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 10);
    assert_eq!(policy.backoff, Duration::from_secs(3));
}

#[tokio::test]
async fn first_success_needs_no_sleep() {
    let timer = ManualTimer::new();
    let outcome = retry_bounded(&policy(5), &timer, |_| async { Ok::<_, &str>(7) }, always_retry).await;

    match outcome {
        RetryOutcome::Succeeded { value, attempts } => {
            assert_eq!(value, 7);
            assert_eq!(attempts, 1);
        }
        other => panic!("expected Succeeded, got: {other:?}"),
    }
    assert_eq!(timer.sleep_count(), 0);
}

#[tokio::test]
async fn attempts_are_numbered_from_one() {
    let timer = ManualTimer::new();
    let seen = std::sync::Mutex::new(Vec::new());

    let outcome = retry_bounded(
        &policy(4),
        &timer,
        |attempt| {
            seen.lock().unwrap().push(attempt);
            async move { if attempt < 3 { Err("busy") } else { Ok(attempt) } }
        },
        always_retry,
    )
    .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts(), 3);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(timer.sleep_count(), 2);
}

#[tokio::test]
async fn exhaustion_makes_n_attempts_and_n_minus_one_sleeps() {
    let timer = ManualTimer::new();
    let calls = AtomicU32::new(0);

    let outcome = retry_bounded(
        &policy(10),
        &timer,
        |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("throttled") }
        },
        always_retry,
    )
    .await;

    match outcome {
        RetryOutcome::Exhausted { error, attempts } => {
            assert_eq!(error, "throttled");
            assert_eq!(attempts, 10);
        }
        other => panic!("expected Exhausted, got: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 10);
    assert_eq!(timer.sleeps(), vec![Duration::from_millis(3_000); 9]);
}

#[tokio::test]
async fn stop_silently_ends_after_one_attempt() {
    let timer = ManualTimer::new();
    let outcome = retry_bounded(
        &policy(10),
        &timer,
        |_| async { Err::<(), _>("gone") },
        |_| RetryDecision::StopSilently,
    )
    .await;

    assert!(matches!(outcome, RetryOutcome::StoppedSilently { attempts: 1, .. }));
    assert_eq!(timer.sleep_count(), 0);
}

#[tokio::test]
async fn stop_and_report_after_transient_failures() {
    let timer = ManualTimer::new();
    let outcome = retry_bounded(
        &policy(10),
        &timer,
        |attempt| async move { Err::<(), _>(if attempt < 3 { "busy" } else { "broken" }) },
        |e: &&str| {
            if *e == "busy" {
                RetryDecision::Retry
            } else {
                RetryDecision::StopAndReport
            }
        },
    )
    .await;

    match outcome {
        RetryOutcome::StoppedWithReport { error, attempts } => {
            assert_eq!(error, "broken");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected StoppedWithReport, got: {other:?}"),
    }
    assert_eq!(timer.sleep_count(), 2);
}

#[tokio::test]
async fn interrupted_sleep_ends_retries() {
    let timer = ManualTimer::interrupting_after(1);
    let calls = AtomicU32::new(0);

    let outcome = retry_bounded(
        &policy(10),
        &timer,
        |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("busy") }
        },
        always_retry,
    )
    .await;

    assert!(matches!(outcome, RetryOutcome::Interrupted { attempts: 2, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn single_attempt_policy_never_sleeps() {
    let timer = ManualTimer::new();
    let outcome =
        retry_bounded(&policy(1), &timer, |_| async { Err::<(), _>("busy") }, always_retry).await;

    assert!(matches!(outcome, RetryOutcome::Exhausted { attempts: 1, .. }));
    assert_eq!(timer.sleep_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn tokio_timer_interrupted_by_shutdown() {
    use streamseal_stream::timer::{SleepOutcome, Timer, TokioTimer, shutdown_channel};

    let (tx, rx) = shutdown_channel();
    let timer = TokioTimer::with_shutdown(rx);

    assert_eq!(timer.sleep(Duration::from_secs(1)).await, SleepOutcome::Completed);

    tx.send(true).unwrap();
    assert_eq!(timer.sleep(Duration::from_secs(3600)).await, SleepOutcome::Interrupted);
}

#[tokio::test(start_paused = true)]
async fn tokio_timer_without_shutdown_completes() {
    use streamseal_stream::timer::{SleepOutcome, Timer, TokioTimer};

    let timer = TokioTimer::new();
    let before = timer.now();
    assert_eq!(timer.sleep(Duration::from_secs(5)).await, SleepOutcome::Completed);
    assert!(timer.now() - before >= Duration::from_secs(5));
}
