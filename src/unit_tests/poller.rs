use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::Error;
use crate::poller::*;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[tokio::test(start_paused = true)]
async fn test_success_on_first_attempt_returns_immediately() {
    let outcome = wait_for(|_| async { Ok(42) }, secs(5), secs(60)).await;
    assert!(outcome.succeeded());
    assert_eq!(outcome.value, Some(42));
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.elapsed, Duration::ZERO);
    assert!(outcome.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_success_on_nth_attempt_before_timeout() {
    let calls = AtomicU32::new(0);
    let outcome = wait_for(
        |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Error::NotConverged(format!("attempt {}", n)))
                } else {
                    Ok(n)
                }
            }
        },
        secs(5),
        secs(60),
    )
    .await;
    assert!(outcome.succeeded());
    assert_eq!(outcome.attempts, 3);
    // Two intervals were waited out, the third attempt returned without sleeping.
    assert_eq!(outcome.elapsed, secs(10));
    assert!(outcome.elapsed < secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_reports_last_error_within_one_interval() {
    let calls = AtomicU32::new(0);
    let interval = secs(7);
    let timeout = secs(30);
    let outcome: PollOutcome<()> = wait_for(
        |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(Error::NotConverged(format!("still waiting {}", n))) }
        },
        interval,
        timeout,
    )
    .await;
    assert!(!outcome.succeeded());
    assert!(!outcome.aborted);
    assert!(outcome.elapsed >= timeout);
    assert!(outcome.elapsed < timeout + interval);
    assert_eq!(outcome.attempts, 5);
    match outcome.into_result("node readiness") {
        Err(Error::Timeout {
            stage,
            attempts,
            reason,
            ..
        }) => {
            assert_eq!(stage, "node readiness");
            assert_eq!(attempts, 5);
            assert!(reason.contains("still waiting 5"));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_aborts_immediately() {
    let outcome: PollOutcome<()> = wait_for(
        |_| async { Err(Error::parse("ready/total", "1of2")) },
        secs(5),
        secs(600),
    )
    .await;
    assert!(outcome.aborted);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.elapsed, Duration::ZERO);
    assert!(matches!(
        outcome.into_result("pod readiness"),
        Err(Error::ParseFailed { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_retried() {
    let calls = AtomicU32::new(0);
    let outcome = wait_for(
        |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(Error::collection("nodes", "connection refused"))
                } else {
                    Ok(())
                }
            }
        },
        secs(5),
        secs(600),
    )
    .await;
    assert!(outcome.succeeded());
    assert_eq!(outcome.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_hung_attempt_is_bounded_by_deadline() {
    let outcome: PollOutcome<()> = wait_for(
        |_| async {
            sleep(secs(10_000)).await;
            Ok(())
        },
        secs(2),
        secs(10),
    )
    .await;
    assert!(!outcome.succeeded());
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.elapsed >= secs(10));
    assert!(outcome.elapsed < secs(10) + secs(2));
    assert!(matches!(outcome.last_error, Some(Error::NotConverged(_))));
}

#[tokio::test(start_paused = true)]
async fn test_slow_attempts_do_not_overshoot_timeout() {
    let outcome: PollOutcome<()> = wait_for(
        |_| async {
            sleep(secs(4)).await;
            Err(Error::collection("pods", "the server is currently unable to handle the request"))
        },
        secs(5),
        secs(20),
    )
    .await;
    // Attempts start at 0s, 9s and 18s; the last one is cut off at the deadline.
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.elapsed >= secs(20));
    assert!(outcome.elapsed < secs(20) + secs(5));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn test_failed_wait_ends_within_one_interval_of_timeout(
        work in 0u64..15,
        interval in 1u64..10,
        timeout in 1u64..60,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        let outcome: PollOutcome<()> = runtime.block_on(wait_for(
            |_| async move {
                sleep(secs(work)).await;
                Err(Error::NotConverged("not yet".to_string()))
            },
            secs(interval),
            secs(timeout),
        ));
        prop_assert!(!outcome.succeeded());
        prop_assert!(outcome.elapsed >= secs(timeout));
        prop_assert!(outcome.elapsed < secs(timeout) + secs(interval));
    }
}

#[tokio::test(start_paused = true)]
async fn test_predicate_sees_shrinking_deadline() {
    let seen = Mutex::new(Vec::new());
    let outcome = wait_for(
        |deadline: Deadline| {
            seen.lock().unwrap().push(deadline.remaining());
            let done = seen.lock().unwrap().len() == 3;
            async move {
                if done {
                    Ok(())
                } else {
                    Err(Error::NotConverged("not yet".to_string()))
                }
            }
        },
        secs(5),
        secs(20),
    )
    .await;
    assert!(outcome.succeeded());
    assert_eq!(*seen.lock().unwrap(), vec![secs(20), secs(15), secs(10)]);
}

#[tokio::test(start_paused = true)]
async fn test_budget_wait_for_uses_its_interval_and_timeout() {
    let budget = PollBudget::from_secs(12, 4);
    let outcome: PollOutcome<()> = budget
        .wait_for("nothing", |_| async {
            Err(Error::NotConverged("never".to_string()))
        })
        .await;
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.elapsed, secs(12));
}
