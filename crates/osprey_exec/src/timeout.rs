//! Deadline wrappers for partition operations.
//!
//! Both wrappers race the wrapped operation against a deadline and the
//! caller's [`CancelSignal`], and return as soon as any of the three
//! resolves. The loser is **detached, not interrupted**: on timeout or
//! cancellation the operation keeps running on the runtime (or, for the
//! blocking variant, keeps occupying its blocking-pool thread) and its
//! eventual result is discarded. An operation that must actually stop has
//! to honor the cancel signal itself; the stores in this workspace do.

use std::future::Future;
use std::time::Duration;

use osprey_common::{CancelSignal, OspreyError, OspreyResult};

/// Run `fut` with a deadline. Returns the operation's own result if it
/// finishes in time, `Timeout` if the deadline fires first, or the
/// cancellation cause if the signal fires first.
pub async fn run_with_timeout<T, F>(
    cancel: &CancelSignal,
    op: &str,
    timeout: Duration,
    fut: F,
) -> OspreyResult<T>
where
    T: Send + 'static,
    F: Future<Output = OspreyResult<T>> + Send + 'static,
{
    let mut handle = tokio::spawn(fut);
    tokio::select! {
        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(join_err) => Err(OspreyError::internal(format!(
                "{} task failed: {}",
                op, join_err
            ))),
        },
        _ = tokio::time::sleep(timeout) => {
            tracing::debug!(op, timeout_ms = timeout.as_millis() as u64, "operation timed out, detaching");
            Err(OspreyError::timeout(op, timeout))
        }
        _ = cancel.cancelled() => {
            Err(cancel
                .cause()
                .unwrap_or_else(|| OspreyError::cancelled(format!("{} cancelled", op))))
        }
    }
}

/// Blocking-pool twin of [`run_with_timeout`] for work that cannot yield,
/// such as a synchronous driver call.
pub async fn run_blocking_with_timeout<T, F>(
    cancel: &CancelSignal,
    op: &str,
    timeout: Duration,
    work: F,
) -> OspreyResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> OspreyResult<T> + Send + 'static,
{
    let mut handle = tokio::task::spawn_blocking(work);
    tokio::select! {
        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(join_err) => Err(OspreyError::internal(format!(
                "{} task failed: {}",
                op, join_err
            ))),
        },
        _ = tokio::time::sleep(timeout) => {
            tracing::debug!(op, timeout_ms = timeout.as_millis() as u64, "blocking operation timed out, detaching");
            Err(OspreyError::timeout(op, timeout))
        }
        _ = cancel.cancelled() => {
            Err(cancel
                .cause()
                .unwrap_or_else(|| OspreyError::cancelled(format!("{} cancelled", op))))
        }
    }
}
