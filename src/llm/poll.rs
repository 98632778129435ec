//! Bounded polling for asynchronous runs.
//!
//! `poll_until` never blocks a thread: waits are `tokio::time::sleep`, so the
//! returned future can be dropped at any await point (caller timeout, task
//! abort) and polling stops right there.

use std::future::Future;
use std::time::Duration;

/// How often and how many times to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Result of a poll that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    Exhausted { attempts: u32 },
}

/// Call `probe` until it yields `Some`, an error, or the attempt budget runs
/// out. The probe receives the 1-based attempt number. There is no sleep
/// after the final attempt.
pub async fn poll_until<T, E, F, Fut>(policy: PollPolicy, mut probe: F) -> Result<PollOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    for attempt in 1..=policy.max_attempts {
        if let Some(value) = probe(attempt).await? {
            return Ok(PollOutcome::Ready(value));
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Ok(PollOutcome::Exhausted {
        attempts: policy.max_attempts,
    })
}
