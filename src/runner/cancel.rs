use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::retry::with_retry;
use super::{RemoteExecutor, WorkItemId};
use crate::config::{QueryRetryPolicy, RunnerConfig};
use crate::errors::{Result, RunError};
use crate::models::JobId;

/// Most work items marked aborted in one request.
pub const ABORT_BATCH_SIZE: usize = 200;

/// Aborts a job's outstanding work and waits until the service agrees
/// nothing is left.
pub struct CancelCoordinator {
    executor: Arc<dyn RemoteExecutor>,
    poll_interval: Duration,
    timeout: Duration,
    retry: QueryRetryPolicy,
}

impl CancelCoordinator {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: &RunnerConfig) -> Self {
        Self {
            executor,
            poll_interval: config.cancel_poll_interval(),
            timeout: config.cancel_timeout(),
            retry: config.query_retry(),
        }
    }

    /// Returns the work items that were outstanding when cancellation began.
    pub async fn cancel(&self, job_id: &JobId) -> Result<Vec<WorkItemId>> {
        let outstanding = self.outstanding(job_id).await?;
        for batch in outstanding.chunks(ABORT_BATCH_SIZE) {
            with_retry("mark aborted", self.retry, || self.executor.mark_aborted(batch)).await?;
        }
        info!(job_id = %job_id, work_items = outstanding.len(), "requested job cancellation");

        let started = Instant::now();
        loop {
            let remaining = self.outstanding(job_id).await?;
            if remaining.is_empty() {
                debug!(job_id = %job_id, "cancellation confirmed");
                return Ok(outstanding);
            }
            if started.elapsed() >= self.timeout {
                return Err(RunError::Timeout {
                    operation: "cancellation",
                    job_id: job_id.to_string(),
                    limit: self.timeout,
                });
            }
            debug!(job_id = %job_id, remaining = remaining.len(), "waiting for cancellation");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn outstanding(&self, job_id: &JobId) -> Result<Vec<WorkItemId>> {
        with_retry("list outstanding", self.retry, || {
            self.executor.list_outstanding(job_id)
        })
        .await
    }
}
