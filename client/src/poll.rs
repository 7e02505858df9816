//! Bounded polling with a fixed interval between attempts.
//!
//! [`poll_until`] is the only retry loop in the crate: the confirmation
//! poller and the RPC finalization wait both go through it. It never
//! returns an error type of its own; callers get a [`PollOutcome`] and
//! decide what a timeout means for them.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Classifies read failures: a transient failure consumes one attempt and
/// polling continues, anything else ends the loop with [`PollOutcome::Error`].
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Attempt budget and pacing for [`poll_until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Total number of reads, including the first one.
    pub max_attempts: u32,
    /// Sleep between two consecutive reads.
    pub interval: Duration,
    /// Wall-clock budget checked between attempts.
    pub deadline: Option<Duration>,
}

impl PollConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_INTERVAL)
    }
}

/// Result of a polling run.
#[derive(Debug)]
pub enum PollOutcome<T, E> {
    /// A read satisfied the predicate.
    Ready(T),
    /// The attempt budget or the deadline ran out.
    TimedOut {
        attempts: u32,
        last_error: Option<E>,
    },
    /// The cancellation signal fired between attempts.
    Cancelled { attempts: u32 },
    /// A read failed with a non-transient error.
    Error(E),
}

/// Read until `ready` accepts a value, the budget runs out, or `cancel`
/// flips to `true`.
///
/// Both the deadline and the cancellation signal are only observed between
/// attempts; an in-flight read is never interrupted.
pub async fn poll_until<T, E, F, Fut, P>(
    mut read: F,
    mut ready: P,
    config: &PollConfig,
    mut cancel: Option<watch::Receiver<bool>>,
) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&T) -> bool,
    E: Transient,
{
    let deadline = config.deadline.map(|d| Instant::now() + d);
    let mut last_error = None;
    let mut attempts = 0;

    while attempts < config.max_attempts {
        if is_cancelled(&cancel) {
            return PollOutcome::Cancelled { attempts };
        }

        attempts += 1;
        match read().await {
            Ok(value) if ready(&value) => return PollOutcome::Ready(value),
            Ok(_) => {}
            Err(e) if e.is_transient() => last_error = Some(e),
            Err(e) => return PollOutcome::Error(e),
        }

        if attempts == config.max_attempts {
            break;
        }
        if deadline.is_some_and(|d| Instant::now() + config.interval > d) {
            debug!(attempts, "Poll deadline reached");
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            _ = wait_for_cancel(&mut cancel) => {
                return PollOutcome::Cancelled { attempts };
            }
        }
    }

    PollOutcome::TimedOut {
        attempts,
        last_error,
    }
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

async fn wait_for_cancel(cancel: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = cancel else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        // Sender dropped: cancellation can no longer happen.
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Flaky)
        }
    }

    fn fast(max_attempts: u32) -> PollConfig {
        PollConfig::new(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn returns_first_ready_value() {
        let reads = &AtomicU32::new(0);
        let outcome = poll_until(
            || async move { Ok::<_, TestError>(reads.fetch_add(1, Ordering::SeqCst) + 1) },
            |n| *n >= 3,
            &fast(10),
            None,
        )
        .await;

        assert!(matches!(outcome, PollOutcome::Ready(3)));
        assert_eq!(reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn times_out_after_exact_attempt_count() {
        let reads = &AtomicU32::new(0);
        let outcome = poll_until(
            || async move {
                reads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(0u32)
            },
            |_| false,
            &fast(3),
            None,
        )
        .await;

        assert!(matches!(
            outcome,
            PollOutcome::TimedOut {
                attempts: 3,
                last_error: None
            }
        ));
        assert_eq!(reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transient_errors_consume_attempts() {
        let reads = &AtomicU32::new(0);
        let outcome = poll_until(
            || async move {
                let n = reads.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err(TestError::Flaky) } else { Ok(n) }
            },
            |_| true,
            &fast(5),
            None,
        )
        .await;

        assert!(matches!(outcome, PollOutcome::Ready(2)));
    }

    #[tokio::test]
    async fn timeout_keeps_last_transient_error() {
        let outcome = poll_until(
            || async move { Err::<u32, _>(TestError::Flaky) },
            |_| true,
            &fast(2),
            None,
        )
        .await;

        assert!(matches!(
            outcome,
            PollOutcome::TimedOut {
                attempts: 2,
                last_error: Some(TestError::Flaky)
            }
        ));
    }

    #[tokio::test]
    async fn fatal_error_stops_immediately() {
        let reads = &AtomicU32::new(0);
        let outcome = poll_until(
            || async move {
                reads.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(TestError::Fatal)
            },
            |_| true,
            &fast(5),
            None,
        )
        .await;

        assert!(matches!(outcome, PollOutcome::Error(TestError::Fatal)));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_is_observed_between_attempts() {
        let (tx, rx) = watch::channel(false);
        let tx = &tx;
        let reads = &AtomicU32::new(0);
        let config = PollConfig::new(100, Duration::from_secs(60));

        let outcome = poll_until(
            || async move {
                if reads.fetch_add(1, Ordering::SeqCst) == 0 {
                    tx.send(true).ok();
                }
                Ok::<_, TestError>(())
            },
            |_| false,
            &config,
            Some(rx),
        )
        .await;

        assert!(matches!(outcome, PollOutcome::Cancelled { attempts: 1 }));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn already_cancelled_skips_reads() {
        let (_tx, rx) = watch::channel(true);
        let outcome = poll_until(
            || async move { Ok::<_, TestError>(()) },
            |_| true,
            &fast(5),
            Some(rx),
        )
        .await;

        assert!(matches!(outcome, PollOutcome::Cancelled { attempts: 0 }));
    }

    #[tokio::test]
    async fn deadline_cuts_budget_short() {
        let reads = &AtomicU32::new(0);
        let config = PollConfig::new(100, Duration::from_millis(20)).with_deadline(Duration::from_millis(50));

        let outcome = poll_until(
            || async move {
                reads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(())
            },
            |_| false,
            &config,
            None,
        )
        .await;

        let PollOutcome::TimedOut { attempts, .. } = outcome else {
            panic!("expected timeout, got {outcome:?}");
        };
        assert!(attempts < 100);
        assert_eq!(attempts, reads.load(Ordering::SeqCst));
    }
}
