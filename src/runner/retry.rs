use std::future::Future;

use tracing::warn;

use crate::config::QueryRetryPolicy;
use crate::errors::{Result, RunError};

/// Run `query` until it succeeds or the policy's retries are used up.
///
/// Waits `initial_delay` after the first failure and doubles the wait after
/// each one that follows. Every failed attempt is logged, the last included;
/// the final error is returned as [`RunError::Query`] tagged with `stage`.
pub async fn with_retry<T, F, Fut>(stage: &str, policy: QueryRetryPolicy, mut query: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut retry = 0;
    loop {
        match query().await {
            Ok(value) => return Ok(value),
            Err(e) if retry >= policy.max_retries => {
                warn!(
                    stage,
                    attempt = retry + 1,
                    error = %format!("{:#}", e),
                    "query failed, no retries left"
                );
                return Err(RunError::query(stage, e));
            }
            Err(e) => {
                let delay = policy.delay_for(retry);
                warn!(
                    stage,
                    attempt = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %format!("{:#}", e),
                    "query failed, retrying"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
        }
    }
}
