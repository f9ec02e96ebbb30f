//! Time-bounded store calls.

use std::future::Future;
use std::time::Duration;

use qg_domain::{StoreError, StoreResult};

/// Await `fut`, failing with [`StoreError::Timeout`] once `limit` elapses.
pub(crate) async fn bounded<T, F>(op: &'static str, limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            op,
            after_ms: limit.as_millis() as u64,
        }),
    }
}
