use std::future::Future;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::debug;

use super::RemoteExecutor;
use super::retry::with_retry;
use crate::config::QueryRetryPolicy;
use crate::errors::Result;
use crate::models::{CoverageAggregate, JobId, TestResult};

/// Largest id list sent in a single coverage query.
pub const COVERAGE_CHUNK_SIZE: usize = 500;

/// Fetches what a job produced: its results, and optionally coverage for
/// the test classes that ran.
pub struct ResultAggregator {
    executor: Arc<dyn RemoteExecutor>,
    retry: QueryRetryPolicy,
}

impl ResultAggregator {
    pub fn new(executor: Arc<dyn RemoteExecutor>, retry: QueryRetryPolicy) -> Self {
        Self { executor, retry }
    }

    /// All results of the job, following pages when the service caps rows.
    pub async fn gather_results(&self, job_id: &JobId) -> Result<Vec<TestResult>> {
        self.gather_from(job_id, 0, self.retry).await
    }

    /// Results past the first `offset`, tried once. Progress reporting uses
    /// this, so a failing query never delays the poll loop.
    pub async fn results_since(&self, job_id: &JobId, offset: usize) -> Result<Vec<TestResult>> {
        self.gather_from(job_id, offset, self.retry.with_max_retries(0))
            .await
    }

    async fn gather_from(
        &self,
        job_id: &JobId,
        offset: usize,
        retry: QueryRetryPolicy,
    ) -> Result<Vec<TestResult>> {
        let Some(limit) = self.executor.row_cap().filter(|&cap| cap > 0) else {
            return with_retry("results", retry, || {
                self.executor.results(job_id, offset, None)
            })
            .await;
        };

        let mut results = Vec::new();
        loop {
            let page_offset = offset + results.len();
            let page = with_retry("results", retry, || {
                self.executor.results(job_id, page_offset, Some(limit))
            })
            .await?;
            let last_page = page.len() < limit;
            results.extend(page);
            if last_page {
                break;
            }
        }
        debug!(job_id = %job_id, offset, count = results.len(), "gathered results");
        Ok(results)
    }

    /// Coverage for every class touched by `test_classes`. Both query stages
    /// fan out over chunks of [`COVERAGE_CHUNK_SIZE`] ids concurrently.
    pub async fn gather_coverage(&self, test_classes: &[String]) -> Result<Vec<CoverageAggregate>> {
        if test_classes.is_empty() {
            return Ok(Vec::new());
        }

        let mut class_ids = self
            .chunked("coverage by test class", test_classes, |chunk| {
                self.executor.covered_classes(chunk)
            })
            .await?;
        class_ids.sort();
        class_ids.dedup();
        if class_ids.is_empty() {
            return Ok(Vec::new());
        }

        let aggregates = self
            .chunked("coverage aggregate", &class_ids, |chunk| {
                self.executor.coverage_aggregates(chunk)
            })
            .await?;
        debug!(
            test_classes = test_classes.len(),
            covered = aggregates.len(),
            "gathered coverage"
        );
        Ok(aggregates)
    }

    async fn chunked<'a, T, F, Fut>(&self, stage: &str, ids: &'a [String], query: F) -> Result<Vec<T>>
    where
        F: Fn(&'a [String]) -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<T>>>,
    {
        let query = &query;
        let pages = ids
            .chunks(COVERAGE_CHUNK_SIZE)
            .map(|chunk| with_retry(stage, self.retry, move || query(chunk)));
        let pages = try_join_all(pages).await?;
        Ok(pages.into_iter().flatten().collect())
    }
}
