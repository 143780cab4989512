// Task poller
//
// Bounded-retry polling shared by the package-management task protocol and
// the async service-task protocol. Each attempt is a stateless closure call
// that reports either a terminal value or "still pending"; an error from the
// closure aborts immediately. Running out of attempts is its own error.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::Error;

/// Default number of polling attempts.
pub const DEFAULT_RETRY_COUNT: u32 = 60;

/// Default pause between polling attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Attempt budget and fixed inter-attempt delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_COUNT,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Outcome of a single polling attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    /// Terminal success; polling stops and returns the value.
    Done(T),
    /// Non-terminal; sleep and try again.
    Pending,
}

/// Call `check` until it reports [`PollStatus::Done`], an error, or the
/// attempt budget runs out.
///
/// `check` receives the zero-based attempt number. No sleep follows the
/// final attempt.
pub async fn poll<T, F, Fut>(
    policy: RetryPolicy,
    cancel: Option<&CancellationToken>,
    mut check: F,
) -> Result<T, Error>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, Error>>,
{
    for attempt in 0..policy.max_attempts {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(Error::Cancelled);
        }

        if let PollStatus::Done(value) = check(attempt).await? {
            return Ok(value);
        }

        trace!(attempt, max = policy.max_attempts, "task still pending");

        if attempt + 1 < policy.max_attempts {
            match cancel {
                Some(token) => {
                    tokio::select! {
                        () = token.cancelled() => return Err(Error::Cancelled),
                        () = tokio::time::sleep(policy.delay) => {}
                    }
                }
                None => tokio::time::sleep(policy.delay).await,
            }
        }
    }

    Err(Error::PollExhausted {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(10))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_terminal_value() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);

        let result = poll(fast(5), None, |attempt| {
            seen.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(if attempt == 2 {
                    PollStatus::Done("finished")
                } else {
                    PollStatus::Pending
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "finished");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn error_aborts_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);

        let result: Result<(), Error> = poll(fast(5), None, |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            async {
                Err(Error::TaskFailed {
                    task_id: "1234".into(),
                    message: "boom".into(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(Error::TaskFailed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_is_an_explicit_error() {
        let result: Result<(), Error> =
            poll(fast(3), None, |_| async { Ok(PollStatus::Pending) }).await;

        assert!(matches!(result, Err(Error::PollExhausted { attempts: 3 })));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_never_calls_check() {
        let calls = AtomicU32::new(0);

        let result: Result<(), Error> = poll(fast(0), None, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(PollStatus::Pending) }
        })
        .await;

        assert!(matches!(result, Err(Error::PollExhausted { attempts: 0 })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_delay() {
        let token = CancellationToken::new();
        let trigger = token.clone();

        let policy = RetryPolicy::new(10, Duration::from_secs(60));
        let result: Result<(), Error> = poll(policy, Some(&token), |attempt| {
            if attempt == 0 {
                trigger.cancel();
            }
            async { Ok(PollStatus::Pending) }
        })
        .await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
