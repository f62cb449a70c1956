pub mod aggregator;
pub mod async_runner;
pub mod cancel;
pub mod classifier;
pub mod driver;
pub mod retry;
pub mod stats;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CoverageAggregate, ExpectedSet, JobId, RunRecord, TestItem, TestResult};

pub use aggregator::ResultAggregator;
pub use async_runner::{AsyncRunner, CycleOutcome};
pub use cancel::CancelCoordinator;
pub use classifier::{GroupedResults, ResultClassifier};
pub use driver::{RunDriver, RunOutcome};
pub use retry::with_retry;
pub use stats::RunStats;

/// Remote identifier of one queued or running test method.
pub type WorkItemId = String;

/// Adapter for the remote service that actually executes tests.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Queue a batch and return the job it was assigned.
    async fn submit(&self, items: &[TestItem]) -> Result<JobId>;

    /// Run records matching `job_id`. A well-formed job has exactly one.
    async fn status(&self, job_id: &JobId) -> Result<Vec<RunRecord>>;

    /// One page of the job's results. `limit` is `None` when the service
    /// has no row cap, in which case everything comes back in one call.
    async fn results(
        &self,
        job_id: &JobId,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<TestResult>>;

    /// Execute a single test synchronously, outside of any batch.
    async fn run_single_synchronous(&self, item: &TestItem) -> Result<TestResult>;

    /// Work items of the job that are still queued or running.
    async fn list_outstanding(&self, job_id: &JobId) -> Result<Vec<WorkItemId>>;

    async fn mark_aborted(&self, work_items: &[WorkItemId]) -> Result<()>;

    /// Ids of the classes covered by the given test classes.
    async fn covered_classes(&self, test_classes: &[String]) -> Result<Vec<String>>;

    async fn coverage_aggregates(&self, class_ids: &[String]) -> Result<Vec<CoverageAggregate>>;

    /// Maximum rows a single query returns, if the service caps them.
    fn row_cap(&self) -> Option<usize> {
        None
    }

    /// Display name for this executor.
    fn name(&self) -> &str;
}

/// Source of the tests a run is expected to produce results for.
#[async_trait]
pub trait TestDiscovery: Send + Sync {
    async fn expected_test_set(&self) -> Result<ExpectedSet>;
}
