//! Error boundary for calls whose failure must never reach the caller.

use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Awaits `fut`, logging and discarding any error.
///
/// The return type carries no error, so an absorbed failure cannot be
/// turned back into a propagated one with `?`.
pub async fn absorb<T, E, F>(operation: &'static str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(operation, error = %err, "best-effort operation failed");
            None
        }
    }
}
