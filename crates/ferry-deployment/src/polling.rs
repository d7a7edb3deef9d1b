//! Observation loops with exponential back-off
//!
//! Staging, start and job completion are all observed the same way: read
//! the remote resource, stop on a terminal answer, otherwise sleep and read
//! again. Only reads are repeated here; mutations are never retried.

use ferry_platform::PlatformError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shortest delay between two probes
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Doubling delay capped at a maximum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    /// Both bounds are raised to at least one millisecond so a zero delay
    /// cannot turn the loop into a busy spin.
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(MIN_DELAY);
        Self {
            next: initial.clamp(MIN_DELAY, max),
            max,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }
}

/// One observation of a remote resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// A definitive answer, positive or negative
    Ready(T),
    /// Not there yet
    Pending,
}

/// Why an observation loop stopped without an answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    TimedOut,
    Cancelled,
    Platform(PlatformError),
}

/// Probe until it is ready, the budget is spent or `cancel` fires.
///
/// Transient platform errors count as `Pending`; any other platform error
/// ends the loop.
pub async fn poll_until<T, F, Fut>(
    mut backoff: Backoff,
    timeout: Duration,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>, PlatformError>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        match probe().await {
            Ok(Probe::Ready(value)) => return Ok(value),
            Ok(Probe::Pending) => {}
            Err(error) if error.is_transient() => {
                warn!(%error, "Transient platform error, polling again");
            }
            Err(error) => return Err(PollError::Platform(error)),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(PollError::TimedOut);
        }

        let delay = backoff.next_delay().min(remaining);
        debug!(delay_ms = delay.as_millis() as u64, "Waiting before next poll");
        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
