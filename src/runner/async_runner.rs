use std::collections::HashSet;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::aggregator::ResultAggregator;
use super::cancel::CancelCoordinator;
use super::retry::with_retry;
use super::stats::RunStats;
use super::RemoteExecutor;
use crate::config::RunnerConfig;
use crate::errors::{Result, RunError};
use crate::events::{EventSender, RunEvent, emit};
use crate::models::{JobId, RunRecord, RunStatus, TestItem, TestResult};

/// What one submission cycle ended with.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub job_id: JobId,
    pub record: RunRecord,
    pub results: Vec<TestResult>,
}

enum Settled {
    Done(CycleOutcome),
    Hung(RunStats),
}

/// Drives one batch through submit, poll and either a terminal status or a
/// hang. A hung job is cancelled and the same items are submitted again,
/// up to `max_run_retries` submissions in total.
pub struct AsyncRunner {
    executor: Arc<dyn RemoteExecutor>,
    config: RunnerConfig,
    items: Vec<TestItem>,
    aggregator: ResultAggregator,
    canceller: CancelCoordinator,
    cancel_token: CancellationToken,
    events: Option<EventSender>,
}

impl AsyncRunner {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: &RunnerConfig, items: Vec<TestItem>) -> Self {
        Self {
            aggregator: ResultAggregator::new(Arc::clone(&executor), config.query_retry()),
            canceller: CancelCoordinator::new(Arc::clone(&executor), config),
            executor,
            config: config.clone(),
            items,
            cancel_token: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_events(mut self, events: Option<EventSender>) -> Self {
        self.events = events;
        self
    }

    pub fn items(&self) -> &[TestItem] {
        &self.items
    }

    pub async fn run(&self) -> Result<CycleOutcome> {
        let mut stats = RunStats::new(self.config.hang_stall_threshold);
        loop {
            let job_id = self.submit().await?;
            match self.poll(&job_id, stats).await? {
                Settled::Done(outcome) => return Ok(outcome),
                Settled::Hung(hung) => {
                    warn!(
                        job_id = %job_id,
                        stalled_polls = hung.stall_count,
                        completed = hung.last_completed,
                        "job made no progress, cancelling"
                    );
                    emit(
                        self.events.as_ref(),
                        RunEvent::Hung {
                            job_id: job_id.clone(),
                            stalled_polls: hung.stall_count,
                            reset_count: hung.reset_count,
                        },
                    );
                    let cancelled = self.canceller.cancel(&job_id).await?;
                    emit(
                        self.events.as_ref(),
                        RunEvent::Cancelled {
                            job_id: job_id.clone(),
                            work_items: cancelled.len(),
                        },
                    );

                    stats = hung.reset();
                    if stats.reset_count > self.config.max_run_retries.saturating_sub(1) {
                        return Err(RunError::RetryExhausted {
                            job_id: job_id.to_string(),
                            attempts: stats.reset_count,
                        });
                    }
                    info!(
                        previous_job = %job_id,
                        reset_count = stats.reset_count,
                        items = self.items.len(),
                        "resubmitting hung batch"
                    );
                }
            }
        }
    }

    async fn submit(&self) -> Result<JobId> {
        let job_id = with_retry("submit", self.config.query_retry(), || {
            self.executor.submit(&self.items)
        })
        .await?;
        info!(job_id = %job_id, items = self.items.len(), executor = self.executor.name(), "submitted batch");
        emit(
            self.events.as_ref(),
            RunEvent::Submitted {
                job_id: job_id.clone(),
                items: self.items.len(),
            },
        );
        Ok(job_id)
    }

    async fn poll(&self, job_id: &JobId, mut stats: RunStats) -> Result<Settled> {
        let started = Instant::now();
        let mut seen = HashSet::new();
        let mut observed = 0;

        loop {
            tokio::time::sleep(self.config.poll_interval()).await;

            if self.cancel_token.is_cancelled() {
                return self.abort(job_id).await.map(Settled::Done);
            }

            let record = self.fetch_record(job_id).await?;
            debug!(
                job_id = %job_id,
                status = record.status.label(),
                completed = record.methods_completed,
                enqueued = record.methods_enqueued,
                "polled job"
            );
            emit(
                self.events.as_ref(),
                RunEvent::Polled {
                    job_id: job_id.clone(),
                    record: record.clone(),
                },
            );

            if record.status.is_terminal() {
                let results = if record.status == RunStatus::Aborted {
                    Vec::new()
                } else {
                    self.aggregator.gather_results(job_id).await?
                };
                self.report_unseen(&results, &mut seen);
                info!(
                    job_id = %job_id,
                    status = record.status.label(),
                    results = results.len(),
                    "job finished"
                );
                emit(
                    self.events.as_ref(),
                    RunEvent::CycleFinished {
                        job_id: job_id.clone(),
                        record: record.clone(),
                    },
                );
                return Ok(Settled::Done(CycleOutcome {
                    job_id: job_id.clone(),
                    record,
                    results,
                }));
            }

            if self.events.is_some() {
                match self.aggregator.results_since(job_id, observed).await {
                    Ok(results) => {
                        observed += results.len();
                        self.report_unseen(&results, &mut seen);
                    }
                    Err(e) => debug!(job_id = %job_id, error = %e, "skipping progress report"),
                }
            }

            if started.elapsed() >= self.config.run_timeout() {
                return Err(RunError::Timeout {
                    operation: "run poll",
                    job_id: job_id.to_string(),
                    limit: self.config.run_timeout(),
                });
            }

            stats = stats.update(record.methods_completed);
            if stats.is_hung() {
                return Ok(Settled::Hung(stats));
            }
        }
    }

    async fn abort(&self, job_id: &JobId) -> Result<CycleOutcome> {
        info!(job_id = %job_id, "cancellation requested, aborting job");
        let cancelled = self.canceller.cancel(job_id).await?;
        emit(
            self.events.as_ref(),
            RunEvent::Cancelled {
                job_id: job_id.clone(),
                work_items: cancelled.len(),
            },
        );
        let mut record = self.fetch_record(job_id).await?;
        record.status = RunStatus::Aborted;
        Ok(CycleOutcome {
            job_id: job_id.clone(),
            record,
            results: Vec::new(),
        })
    }

    async fn fetch_record(&self, job_id: &JobId) -> Result<RunRecord> {
        let records = with_retry("status", self.config.query_retry(), || {
            self.executor.status(job_id)
        })
        .await?;
        let [record]: [RunRecord; 1] = records.try_into().map_err(|records: Vec<RunRecord>| {
            RunError::general(format!(
                "expected one run record for job {}, found {}",
                job_id,
                records.len()
            ))
        })?;
        Ok(record)
    }

    fn report_unseen(&self, results: &[TestResult], seen: &mut HashSet<String>) {
        if self.events.is_none() {
            return;
        }
        for result in results {
            if seen.insert(result.key()) {
                emit(
                    self.events.as_ref(),
                    RunEvent::TestFinished {
                        result: result.clone(),
                    },
                );
            }
        }
    }
}
