//! Generic concurrent agent-call dispatch with timeout and panic recovery (§5, §7).
//!
//! Every fan-out region (vote collection, werewolf dialogue is the one exception, see
//! below, and day-end reflections) goes through [`call_with_timeout`]. A stalled or
//! panicking policy call is recovered identically: both collapse to [`CallOutcome::Failed`]
//! and the caller substitutes its own safe default. The only thing that differs is which
//! `tracing` field records the cause, which callers log via [`CallOutcome::cause`].
//!
//! Werewolf dialogue turns (C4) are deliberately *not* dispatched through here: each turn may
//! reference the prior one, so they run sequentially in the discussion loop itself, still
//! wrapped individually for robustness against a single failed turn.

use std::future::Future;
use std::time::Duration;

/// Result of a single timed, panic-guarded agent call.
pub enum CallOutcome<T> {
    Ok(T),
    Failed { cause: FailureCause },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FailureCause {
    Timeout,
    Panic,
}

impl FailureCause {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureCause::Timeout => "timeout",
            FailureCause::Panic => "panic",
        }
    }
}

/// Spawns `fut` as its own task and joins it with `timeout`. A timeout and a panic inside
/// the task are both folded into `CallOutcome::Failed`: from the caller's perspective
/// "the agent failed to answer" has one shape regardless of why.
///
/// On timeout the spawned task is left running to completion in the background; its result
/// is simply never observed (§5: in-flight calls are not hard-killed).
pub async fn call_with_timeout<F, T>(timeout: Duration, fut: F) -> CallOutcome<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(fut);

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(value)) => CallOutcome::Ok(value),
        Ok(Err(join_error)) => {
            tracing::warn!(panic = %join_error, "agent call panicked");
            CallOutcome::Failed {
                cause: FailureCause::Panic,
            }
        }
        Err(_elapsed) => {
            tracing::warn!("agent call timed out");
            CallOutcome::Failed {
                cause: FailureCause::Timeout,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_call_returns_ok() {
        let outcome = call_with_timeout(Duration::from_secs(1), async { 42 }).await;
        match outcome {
            CallOutcome::Ok(v) => assert_eq!(v, 42),
            CallOutcome::Failed { .. } => panic!("expected Ok"),
        }
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let outcome = call_with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            42
        })
        .await;
        match outcome {
            CallOutcome::Failed { cause } => assert_eq!(cause, FailureCause::Timeout),
            CallOutcome::Ok(_) => panic!("expected timeout"),
        }
    }

    #[tokio::test]
    async fn panicking_call_is_recovered() {
        let outcome = call_with_timeout(Duration::from_secs(1), async {
            panic!("boom");
            #[allow(unreachable_code)]
            42
        })
        .await;
        match outcome {
            CallOutcome::Failed { cause } => assert_eq!(cause, FailureCause::Panic),
            CallOutcome::Ok(_) => panic!("expected panic to be recovered"),
        }
    }
}
