use std::future::Future;
use std::time::Duration;

/// Race `operation` against a deadline.
///
/// If the deadline elapses first, `timeout_error` is returned and the
/// operation is dropped. Dropping a [`PendingCall`](crate::PendingCall) does
/// not cancel anything at the engine; its slot is marked abandoned until the
/// late reply arrives or the connection reaps it.
pub async fn with_timeout<F, T, E>(operation: F, duration: Duration, timeout_error: E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::debug!(timeout = ?duration, "operation timed out");
            Err(timeout_error)
        }
    }
}
