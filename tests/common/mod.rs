#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;
use batchrun::models::{
    CoverageAggregate, JobId, ResultStore, RunRecord, RunStatus, TestCaseId, TestItem, TestOutcome,
    TestResult,
};
use batchrun::report::Reporter;
use batchrun::runner::{RemoteExecutor, WorkItemId};
use batchrun::{QueryRetryPolicy, RunnerConfig};
use chrono::Utc;
use tokio::time::Instant;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("batchrun=debug")
        .with_test_writer()
        .try_init();
}

/// Fast settings; the tests also run on tokio's paused clock.
pub fn config() -> RunnerConfig {
    RunnerConfig {
        poll_interval_ms: 1_000,
        run_timeout_mins: 10,
        cancel_poll_interval_ms: 1_000,
        cancel_timeout_mins: 1,
        max_run_retries: 3,
        hang_stall_threshold: 3,
        max_errors_for_rerun: 10,
        max_query_retries: 2,
        query_initial_interval_ms: 100,
        rerun_rules_file: None,
        collect_coverage: false,
    }
}

pub fn retry() -> QueryRetryPolicy {
    config().query_retry()
}

pub fn result(class_name: &str, method: &str, outcome: TestOutcome, message: Option<&str>) -> TestResult {
    TestResult {
        id: TestCaseId::new(class_name, method),
        outcome,
        message: message.map(str::to_string),
        stack_trace: message.map(|m| format!("Class.{class_name}.{method}: line 1\n{m}")),
        run_time_ms: 10,
        completed_at: Utc::now(),
    }
}

pub fn record(status: RunStatus, completed: u64, failed: u64) -> RunRecord {
    RunRecord {
        status,
        start_time: None,
        end_time: None,
        test_time_ms: completed * 10,
        classes_enqueued: 1,
        classes_completed: u64::from(status.is_terminal()),
        methods_enqueued: completed + failed,
        methods_completed: completed,
        methods_failed: failed,
    }
}

/// What one submitted job does: the records returned on successive status
/// polls (the last one repeats) and the results it eventually reports.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub polls: Vec<RunRecord>,
    pub results: Vec<TestResult>,
    /// Overrides the number of records a status query returns.
    pub records_per_status: Option<usize>,
    /// Work items that stay outstanding until aborted.
    pub work_items: Vec<WorkItemId>,
    /// Outstanding lists ignore aborts, so cancellation never confirms.
    pub ignore_aborts: bool,
}

impl Script {
    pub fn completes(record: RunRecord, results: Vec<TestResult>) -> Self {
        Self {
            polls: vec![record],
            results,
            ..Default::default()
        }
    }

    pub fn hangs(completed: u64) -> Self {
        Self {
            polls: vec![record(RunStatus::Processing, completed, 0)],
            work_items: vec!["wi-1".into(), "wi-2".into()],
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct Job {
    script: Script,
    polls: usize,
    aborted: bool,
}

#[derive(Default)]
struct State {
    scripts: VecDeque<Script>,
    jobs: HashMap<String, Job>,
    submissions: Vec<Vec<TestItem>>,
    submitted_at: Vec<Instant>,
    results_fail_while_running: bool,
    single_runs: Vec<TestItem>,
    single_outcomes: HashMap<String, TestOutcome>,
    aborted: Vec<Vec<WorkItemId>>,
    status_failures: usize,
    covered: HashMap<String, Vec<String>>,
    coverage_queries: Vec<Vec<String>>,
    fail_coverage_aggregates: bool,
}

/// In-memory stand-in for the remote service, driven by [`Script`]s.
#[derive(Default)]
pub struct ScriptedExecutor {
    state: Mutex<State>,
    row_cap: Option<usize>,
}

impl ScriptedExecutor {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        let executor = Self::default();
        executor.state.lock().unwrap().scripts = scripts.into_iter().collect();
        executor
    }

    pub fn with_row_cap(mut self, cap: usize) -> Self {
        self.row_cap = Some(cap);
        self
    }

    /// Outcome returned when `key` is run on its own. Defaults to `Fail`.
    pub fn single_outcome(&self, key: &str, outcome: TestOutcome) {
        self.state
            .lock()
            .unwrap()
            .single_outcomes
            .insert(key.to_string(), outcome);
    }

    /// The next `count` status queries fail.
    pub fn fail_status(&self, count: usize) {
        self.state.lock().unwrap().status_failures = count;
    }

    /// Results queries fail until the job's last polled status is terminal.
    pub fn fail_results_while_running(&self) {
        self.state.lock().unwrap().results_fail_while_running = true;
    }

    pub fn cover(&self, test_class: &str, class_ids: &[&str]) {
        self.state.lock().unwrap().covered.insert(
            test_class.to_string(),
            class_ids.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn fail_coverage_aggregates(&self) {
        self.state.lock().unwrap().fail_coverage_aggregates = true;
    }

    pub fn submissions(&self) -> Vec<Vec<TestItem>> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn submitted_at(&self) -> Vec<Instant> {
        self.state.lock().unwrap().submitted_at.clone()
    }

    pub fn single_runs(&self) -> Vec<TestItem> {
        self.state.lock().unwrap().single_runs.clone()
    }

    pub fn aborted(&self) -> Vec<Vec<WorkItemId>> {
        self.state.lock().unwrap().aborted.clone()
    }

    pub fn coverage_queries(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().coverage_queries.clone()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn submit(&self, items: &[TestItem]) -> Result<JobId> {
        let mut state = self.state.lock().unwrap();
        let Some(script) = state.scripts.pop_front() else {
            bail!("no scripted job left for submission {}", state.submissions.len() + 1);
        };
        state.submissions.push(items.to_vec());
        state.submitted_at.push(Instant::now());
        let id = format!("job-{}", state.submissions.len());
        state.jobs.insert(
            id.clone(),
            Job {
                script,
                ..Default::default()
            },
        );
        Ok(JobId(id))
    }

    async fn status(&self, job_id: &JobId) -> Result<Vec<RunRecord>> {
        let mut state = self.state.lock().unwrap();
        if state.status_failures > 0 {
            state.status_failures -= 1;
            bail!("503 service unavailable");
        }
        let Some(job) = state.jobs.get_mut(job_id.as_str()) else {
            bail!("unknown job {job_id}");
        };
        let index = job.polls.min(job.script.polls.len().saturating_sub(1));
        job.polls += 1;
        let record = job.script.polls.get(index).cloned().unwrap_or_default();
        let count = job.script.records_per_status.unwrap_or(1);
        Ok(vec![record; count])
    }

    async fn results(
        &self,
        job_id: &JobId,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<TestResult>> {
        let state = self.state.lock().unwrap();
        let Some(job) = state.jobs.get(job_id.as_str()) else {
            bail!("unknown job {job_id}");
        };
        if state.results_fail_while_running {
            let last = job.polls.saturating_sub(1).min(job.script.polls.len().saturating_sub(1));
            let running = job.script.polls.get(last).is_none_or(|r| !r.status.is_terminal());
            if running {
                bail!("results query timed out");
            }
        }
        if let (Some(cap), Some(limit)) = (self.row_cap, limit) {
            assert!(limit <= cap, "page larger than the row cap");
        }
        let all = &job.script.results;
        let end = limit.map_or(all.len(), |l| (offset + l).min(all.len()));
        Ok(all.get(offset.min(all.len())..end).unwrap_or_default().to_vec())
    }

    async fn run_single_synchronous(&self, item: &TestItem) -> Result<TestResult> {
        let mut state = self.state.lock().unwrap();
        state.single_runs.push(item.clone());
        let method = item.methods.first().cloned().unwrap_or_default();
        let key = format!("{}.{}", item.class_name, method);
        let outcome = state
            .single_outcomes
            .get(&key)
            .copied()
            .unwrap_or(TestOutcome::Fail);
        let message = (outcome != TestOutcome::Pass).then_some("rerun failed");
        Ok(result(&item.class_name, &method, outcome, message))
    }

    async fn list_outstanding(&self, job_id: &JobId) -> Result<Vec<WorkItemId>> {
        let state = self.state.lock().unwrap();
        let Some(job) = state.jobs.get(job_id.as_str()) else {
            bail!("unknown job {job_id}");
        };
        if job.aborted && !job.script.ignore_aborts {
            return Ok(Vec::new());
        }
        Ok(job.script.work_items.clone())
    }

    async fn mark_aborted(&self, work_items: &[WorkItemId]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.aborted.push(work_items.to_vec());
        for job in state.jobs.values_mut() {
            if job.script.work_items.iter().any(|w| work_items.contains(w)) {
                job.aborted = true;
            }
        }
        Ok(())
    }

    async fn covered_classes(&self, test_classes: &[String]) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.coverage_queries.push(test_classes.to_vec());
        Ok(test_classes
            .iter()
            .filter_map(|t| state.covered.get(t))
            .flatten()
            .cloned()
            .collect())
    }

    async fn coverage_aggregates(&self, class_ids: &[String]) -> Result<Vec<CoverageAggregate>> {
        let state = self.state.lock().unwrap();
        if state.fail_coverage_aggregates {
            bail!("aggregate query rejected");
        }
        Ok(class_ids
            .iter()
            .map(|id| CoverageAggregate {
                class_id: id.clone(),
                class_name: format!("Class_{id}"),
                lines_covered: 8,
                lines_uncovered: 2,
            })
            .collect())
    }

    fn row_cap(&self) -> Option<usize> {
        self.row_cap
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Reporter that only counts how often it was asked to generate output.
#[derive(Default)]
pub struct CountingReporter {
    pub calls: std::sync::Arc<Mutex<Vec<usize>>>,
}

impl Reporter for CountingReporter {
    fn generate(&self, store: &ResultStore) -> Result<()> {
        self.calls.lock().unwrap().push(store.len());
        Ok(())
    }

    fn name(&self) -> &str {
        "counting"
    }
}
