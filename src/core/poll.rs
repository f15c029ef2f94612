//! Bounded, cancellable polling.
//!
//! Used both for work item status and for waiting until an output object
//! becomes visible in the store.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Fixed-interval polling schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Wait before the first check
    #[serde(default, rename = "initial_delay_ms", with = "millis")]
    pub initial_delay: Duration,

    /// Wait between consecutive checks
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,

    /// Maximum number of checks (including the first)
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            interval,
            max_attempts,
        }
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Work item status: 2s apart, 60 polls (about two minutes)
    pub fn job_default() -> Self {
        Self::new(Duration::from_secs(2), 60).with_initial_delay(Duration::from_secs(2))
    }

    /// Output visibility: wait 2s, then up to 5 attempts 3s apart
    pub fn result_default() -> Self {
        Self::new(Duration::from_secs(3), 5).with_initial_delay(Duration::from_secs(2))
    }

    /// Worst-case time spent sleeping before giving up
    pub fn budget(&self) -> Duration {
        self.initial_delay + self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// How a poll loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The predicate accepted a check result
    Ready { value: T, attempts: u32 },

    /// Every attempt was used without reaching the predicate
    Exhausted { last: Option<T>, attempts: u32 },

    /// The caller cancelled the loop
    Cancelled { attempts: u32 },
}

/// Check until `is_done` accepts a value, the attempt ceiling is hit, or
/// `cancel` fires.
///
/// `check` receives the 1-indexed attempt number. An `Err` from the check
/// aborts the loop immediately. No sleep follows the final attempt.
pub async fn poll_until<T, E, F, Fut, P>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut check: F,
    is_done: P,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
{
    if !policy.initial_delay.is_zero() && !sleep_or_cancel(policy.initial_delay, cancel).await {
        return Ok(PollOutcome::Cancelled { attempts: 0 });
    }

    let mut last = None;

    for attempt in 1..=policy.max_attempts {
        let value = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(PollOutcome::Cancelled { attempts: attempt - 1 });
            }
            value = check(attempt) => value?,
        };

        if is_done(&value) {
            return Ok(PollOutcome::Ready {
                value,
                attempts: attempt,
            });
        }
        last = Some(value);

        if attempt < policy.max_attempts {
            debug!(attempt, interval_ms = policy.interval.as_millis() as u64, "Not ready, waiting");
            if !sleep_or_cancel(policy.interval, cancel).await {
                return Ok(PollOutcome::Cancelled { attempts: attempt });
            }
        }
    }

    Ok(PollOutcome::Exhausted {
        last,
        attempts: policy.max_attempts,
    })
}

/// Returns false if cancelled before the sleep finished
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
