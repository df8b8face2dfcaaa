//! Best-effort side effects.
//!
//! Bookkeeping writes (audit persistence, last-seen touches) go through here.
//! The only contract is that nothing escapes: errors and panics are captured
//! inside the spawned task and end as a log line. There is no retry.

use std::fmt::Display;
use std::future::Future;

use tokio::task::JoinHandle;

/// Final state of one best-effort operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
}

/// Run `fut` on a detached task. Failures are logged under `label` and dropped.
///
/// The handle is only useful to tests; production callers ignore it.
pub fn spawn<F, E>(label: &'static str, fut: F) -> JoinHandle<Outcome>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let inner = tokio::spawn(fut);
    tokio::spawn(async move {
        match inner.await {
            Ok(Ok(())) => Outcome::Completed,
            Ok(Err(e)) => {
                tracing::warn!(operation = label, error = %e, "Best-effort operation failed");
                Outcome::Failed
            }
            Err(join_err) => {
                tracing::error!(operation = label, error = %join_err, "Best-effort task aborted");
                Outcome::Failed
            }
        }
    })
}
