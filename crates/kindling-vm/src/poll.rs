//! Bounded "poll until predicate" helper shared by every readiness wait.
//!
//! A probe returns `Ok(Some(value))` when the condition holds, `Ok(None)` to
//! keep waiting, or an error which is logged and treated as "not yet". The
//! loop never runs more than `attempts` probes and never sleeps after the
//! final one, so the wall-clock bound is `interval * attempts` plus probe time.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Polling schedule: fixed interval, fixed attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    /// Sleep between two probes.
    pub interval: Duration,
    /// Maximum number of probes.
    pub attempts: u32,
}

impl Poll {
    /// Create a schedule from an interval and an attempt ceiling.
    pub const fn new(interval: Duration, attempts: u32) -> Self {
        Self { interval, attempts }
    }

    /// Derive the attempt ceiling from an overall timeout.
    ///
    /// `from_timeout(120s, 3s)` yields 40 attempts. Always at least one.
    pub fn from_timeout(timeout: Duration, interval: Duration) -> Self {
        let attempts = if interval.is_zero() {
            1
        } else {
            let n = timeout.as_millis().div_ceil(interval.as_millis());
            u32::try_from(n).unwrap_or(u32::MAX).max(1)
        };
        Self { interval, attempts }
    }

    /// Upper bound on time spent sleeping.
    pub fn ceiling(&self) -> Duration {
        self.interval * self.attempts
    }
}

/// Result of a bounded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The probe reported success on attempt `attempts`.
    Ready { value: T, attempts: u32 },
    /// Every attempt was used without success.
    Exhausted { attempts: u32 },
}

impl<T> PollOutcome<T> {
    /// Check if the condition was reached.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Number of probes that were made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Ready { attempts, .. } | Self::Exhausted { attempts } => *attempts,
        }
    }

    /// Convert into the ready value, if any.
    pub fn into_ready(self) -> Option<T> {
        match self {
            Self::Ready { value, .. } => Some(value),
            Self::Exhausted { .. } => None,
        }
    }
}

/// Run `probe` until it yields a value or the schedule is exhausted.
///
/// The probe receives the 1-based attempt number.
pub async fn poll_until<T, E, F, Fut>(poll: Poll, label: &str, mut probe: F) -> PollOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Display,
{
    let start = tokio::time::Instant::now();

    for attempt in 1..=poll.attempts {
        match probe(attempt).await {
            Ok(Some(value)) => {
                tracing::debug!(
                    label,
                    attempt,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Condition reached"
                );
                return PollOutcome::Ready {
                    value,
                    attempts: attempt,
                };
            }
            Ok(None) => {
                tracing::debug!(label, attempt, max = poll.attempts, "Condition not reached yet");
            }
            Err(e) => {
                tracing::debug!(label, attempt, error = %e, "Probe failed, retrying");
            }
        }

        if attempt < poll.attempts {
            tokio::time::sleep(poll.interval).await;
        }
    }

    tracing::warn!(
        label,
        attempts = poll.attempts,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Polling exhausted"
    );
    PollOutcome::Exhausted {
        attempts: poll.attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_from_timeout() {
        let poll = Poll::from_timeout(Duration::from_secs(120), Duration::from_secs(3));
        assert_eq!(poll.attempts, 40);

        let poll = Poll::from_timeout(Duration::from_secs(10), Duration::from_secs(3));
        assert_eq!(poll.attempts, 4);

        let poll = Poll::from_timeout(Duration::ZERO, Duration::from_secs(3));
        assert_eq!(poll.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_attempt() {
        let poll = Poll::new(Duration::from_secs(2), 30);
        let start = tokio::time::Instant::now();

        let outcome = poll_until(poll, "test", |attempt| async move {
            Ok::<_, String>((attempt == 3).then_some(attempt))
        })
        .await;

        assert_eq!(
            outcome,
            PollOutcome::Ready {
                value: 3,
                attempts: 3
            }
        );
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_bounded() {
        let poll = Poll::new(Duration::from_secs(2), 30);
        let calls = Cell::new(0u32);
        let start = tokio::time::Instant::now();

        let outcome: PollOutcome<()> = poll_until(poll, "never", |_| {
            calls.set(calls.get() + 1);
            async { Ok::<_, String>(None) }
        })
        .await;

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 30 });
        assert_eq!(calls.get(), 30);
        assert!(start.elapsed() <= poll.ceiling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_errors_are_retried() {
        let poll = Poll::new(Duration::from_millis(100), 5);

        let outcome = poll_until(poll, "flaky", |attempt| async move {
            if attempt < 2 {
                Err("connection refused".to_string())
            } else {
                Ok(Some("up"))
            }
        })
        .await;

        assert!(outcome.is_ready());
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(outcome.into_ready(), Some("up"));
    }
}
