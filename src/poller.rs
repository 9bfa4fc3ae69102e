use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::*;

use crate::error::{Error, Result};

// The point in time after which a convergence wait gives up.
// It is handed to every predicate call so a probe can bound its own work.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    timeout: Duration,
}

impl Deadline {
    pub fn new(timeout: Duration) -> Self {
        Deadline {
            start: Instant::now(),
            timeout,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.timeout
    }
}

// Interval and timeout of one convergence wait, in whole seconds in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollBudget {
    #[serde(with = "secs")]
    pub timeout: Duration,
    #[serde(with = "secs")]
    pub interval: Duration,
}

impl PollBudget {
    pub const fn from_secs(timeout: u64, interval: u64) -> Self {
        PollBudget {
            timeout: Duration::from_secs(timeout),
            interval: Duration::from_secs(interval),
        }
    }

    pub async fn wait_for<T, F, Fut>(&self, what: &str, predicate: F) -> PollOutcome<T>
    where
        F: FnMut(Deadline) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let span = info_span!("wait_for", what);
        wait_for(predicate, self.interval, self.timeout)
            .instrument(span)
            .await
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

// Terminal value of one convergence wait.
#[derive(Debug)]
pub struct PollOutcome<T> {
    pub value: Option<T>,
    pub last_error: Option<Error>,
    pub elapsed: Duration,
    pub attempts: u32,
    // Set when the predicate returned an error that must not be retried.
    pub aborted: bool,
}

impl<T> PollOutcome<T> {
    pub fn succeeded(&self) -> bool {
        self.value.is_some()
    }

    // Turns a failed wait into the error surfaced to the suite:
    // a non-retryable error verbatim, otherwise a timeout carrying the last failure reason.
    pub fn into_result(self, stage: &str) -> Result<T> {
        if let Some(value) = self.value {
            return Ok(value);
        }
        match self.last_error {
            Some(e) if self.aborted => Err(e),
            last => Err(Error::Timeout {
                stage: stage.to_string(),
                elapsed: self.elapsed,
                attempts: self.attempts,
                reason: last
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "condition never held".to_string()),
            }),
        }
    }
}

// Invokes predicate every interval until it returns Ok or timeout has elapsed.
// The first attempt runs immediately and a success returns without waiting out the interval.
// Attempts and sleeps are cut short at the deadline, so a failed wait ends at the timeout.
pub async fn wait_for<T, F, Fut>(mut predicate: F, interval: Duration, timeout: Duration) -> PollOutcome<T>
where
    F: FnMut(Deadline) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Deadline::new(timeout);
    let mut attempts = 0;
    loop {
        attempts += 1;
        let bound = deadline.remaining();
        let failure = match tokio::time::timeout(bound, predicate(deadline)).await {
            Ok(Ok(value)) => {
                info!("Converged after {} attempts in {:?}.", attempts, deadline.elapsed());
                return PollOutcome {
                    value: Some(value),
                    last_error: None,
                    elapsed: deadline.elapsed(),
                    attempts,
                    aborted: false,
                };
            }
            Ok(Err(e)) if !e.is_retryable() => {
                error!("Attempt {} failed with a non-retryable error: {}", attempts, e);
                return PollOutcome {
                    value: None,
                    last_error: Some(e),
                    elapsed: deadline.elapsed(),
                    attempts,
                    aborted: true,
                };
            }
            Ok(Err(e)) => {
                info!("Attempt {} not converged: {}", attempts, e);
                e
            }
            Err(_) => {
                info!("Attempt {} did not complete before the deadline.", attempts);
                Error::NotConverged(format!(
                    "attempt did not complete within the remaining {:?}",
                    bound
                ))
            }
        };

        if !deadline.expired() {
            sleep(interval.min(deadline.remaining())).await;
        }
        if deadline.expired() {
            warn!("Time out after {} attempts in {:?}.", attempts, deadline.elapsed());
            return PollOutcome {
                value: None,
                last_error: Some(failure),
                elapsed: deadline.elapsed(),
                attempts,
                aborted: false,
            };
        }
    }
}
