use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::aggregator::ResultAggregator;
use super::async_runner::{AsyncRunner, CycleOutcome};
use super::classifier::ResultClassifier;
use super::retry::with_retry;
use super::{RemoteExecutor, TestDiscovery};
use crate::config::RunnerConfig;
use crate::errors::{Result, RunError};
use crate::events::{EventSender, RunEvent, emit};
use crate::models::{
    ExpectedSet, Rerun, ResultStore, RunRecord, RunStatus, TestItem, TestOutcome,
};
use crate::report::Reporter;

/// How a top-level invocation ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Results were finalized and handed to every reporter. The store's
    /// `error` is set when the run stopped early on too many failures.
    Finished(ResultStore),
    /// A cycle was aborted; no results are reported.
    Aborted { aggregate: RunRecord },
}

enum Settle {
    Complete,
    TooManyFailures(usize),
    Aborted,
}

/// Top-level control loop: runs the batch, resubmits whatever the service
/// silently dropped until every expected test has a result, then reruns
/// contention failures one at a time.
pub struct RunDriver {
    executor: Arc<dyn RemoteExecutor>,
    discovery: Arc<dyn TestDiscovery>,
    config: RunnerConfig,
    classifier: ResultClassifier,
    reporters: Vec<Box<dyn Reporter>>,
    cancel_token: CancellationToken,
    events: Option<EventSender>,
}

impl RunDriver {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        discovery: Arc<dyn TestDiscovery>,
        config: RunnerConfig,
    ) -> Self {
        let classifier = match &config.rerun_rules_file {
            Some(path) => ResultClassifier::from_file(path),
            None => std::env::current_dir()
                .map(|cwd| ResultClassifier::discover(&cwd))
                .unwrap_or_default(),
        };
        Self {
            executor,
            discovery,
            config,
            classifier,
            reporters: Vec::new(),
            cancel_token: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_classifier(mut self, classifier: ResultClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Run `items` to completion. Test discovery runs alongside the first
    /// cycle and is only awaited once that cycle is done.
    pub async fn run(&self, items: Vec<TestItem>) -> Result<RunOutcome> {
        let first_runner = self.runner_for(items);
        let (expected, first) = tokio::join!(self.discover(), first_runner.run());
        let first = first?;
        if first.record.status == RunStatus::Aborted {
            info!(job_id = %first.job_id, "initial cycle aborted, nothing to report");
            return Ok(RunOutcome::Aborted {
                aggregate: first.record,
            });
        }
        let expected = expected?;
        debug!(expected = expected.method_count(), "test discovery finished");

        let mut store = ResultStore::default();
        match self.complete(&expected, first, &mut store, 0, None).await? {
            Settle::Aborted => {
                info!("gap-filling cycle aborted, nothing to report");
                return Ok(RunOutcome::Aborted {
                    aggregate: store.aggregate().cloned().unwrap_or_default(),
                });
            }
            Settle::TooManyFailures(failures) => {
                warn!(
                    failures,
                    limit = self.config.max_errors_for_rerun,
                    "too many test failures, skipping gap-filling and reruns"
                );
                store.error = Some(format!(
                    "{} genuine failures exceed the rerun limit of {}",
                    failures, self.config.max_errors_for_rerun
                ));
            }
            Settle::Complete => self.rerun_contention_failures(&mut store).await?,
        }

        if self.config.collect_coverage {
            let aggregator = ResultAggregator::new(Arc::clone(&self.executor), self.config.query_retry());
            store.coverage = aggregator.gather_coverage(&store.test_classes()).await?;
        }

        self.finalize(store)
    }

    async fn discover(&self) -> Result<ExpectedSet> {
        self.discovery
            .expected_test_set()
            .await
            .map_err(|e| RunError::query("test discovery", e))
    }

    fn runner_for(&self, items: Vec<TestItem>) -> AsyncRunner {
        AsyncRunner::new(Arc::clone(&self.executor), &self.config, items)
            .with_cancellation(self.cancel_token.clone())
            .with_events(self.events.clone())
    }

    /// Merge a finished cycle and, while tests are still missing, resubmit
    /// just those. Each resubmission must leave fewer tests missing than
    /// the one before it.
    async fn complete(
        &self,
        expected: &ExpectedSet,
        cycle: CycleOutcome,
        store: &mut ResultStore,
        prior_failures: usize,
        previous_missing: Option<&ExpectedSet>,
    ) -> Result<Settle> {
        store.merge_record(cycle.record.clone());
        if cycle.record.status == RunStatus::Aborted {
            return Ok(Settle::Aborted);
        }

        let groups = self.classifier.group_records(&cycle.results);
        store.merge_results(cycle.results);
        let failures = prior_failures + groups.genuinely_failed.len();
        if failures > self.config.max_errors_for_rerun {
            return Ok(Settle::TooManyFailures(failures));
        }

        let missing = expected.missing(store);
        if missing.is_empty() {
            return Ok(Settle::Complete);
        }
        if let Some(previous) = previous_missing
            && missing.method_count() >= previous.method_count()
        {
            return Err(RunError::general(format!(
                "{} expected tests still have no result after resubmitting them",
                missing.method_count()
            )));
        }

        info!(
            missing = missing.method_count(),
            job_id = %cycle.job_id,
            "resubmitting tests without results"
        );
        emit(
            self.events.as_ref(),
            RunEvent::GapFill {
                missing: missing.method_count(),
            },
        );
        let next = self.runner_for(missing.items()).run().await?;
        Box::pin(self.complete(expected, next, store, failures, Some(&missing))).await
    }

    /// Rerun every contention failure on its own, strictly one after another.
    async fn rerun_contention_failures(&self, store: &mut ResultStore) -> Result<()> {
        let retryable = self.classifier.group_records(store.results()).retryable;
        if retryable.is_empty() {
            return Ok(());
        }
        info!(count = retryable.len(), "rerunning contention failures sequentially");

        for before in retryable {
            let item = TestItem::methods(before.id.qualified_class(), [before.id.method_name.as_str()]);
            let after = with_retry("single run", self.config.query_retry(), || {
                self.executor.run_single_synchronous(&item)
            })
            .await?;
            emit(
                self.events.as_ref(),
                RunEvent::Rerun {
                    id: before.id.clone(),
                    outcome: after.outcome,
                },
            );

            if after.is_pass() {
                info!(test = %before.id, "rerun passed, promoting result");
                let mut promoted = before.clone();
                promoted.outcome = TestOutcome::Pass;
                store.replace(promoted);
            } else {
                debug!(test = %before.id, outcome = after.outcome.label(), "rerun did not pass");
            }
            store.reruns.push(Rerun { before, after });
        }
        Ok(())
    }

    fn finalize(&self, store: ResultStore) -> Result<RunOutcome> {
        for reporter in &self.reporters {
            reporter.generate(&store).map_err(|e| {
                RunError::general(format!("{} report failed: {:#}", reporter.name(), e))
            })?;
        }
        info!(
            results = store.len(),
            reruns = store.reruns.len(),
            "run finalized"
        );
        Ok(RunOutcome::Finished(store))
    }
}
