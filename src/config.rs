use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{Result, RunError};

pub const CONFIG_FILE: &str = "batchrun.toml";

/// Upper bound for the run and cancel timeouts: one week.
pub const MAX_TIMEOUT_MINS: u64 = 7 * 24 * 60;

/// Orchestration settings, read from `batchrun.toml` in the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RunnerConfig {
    /// Delay between run status polls.
    pub poll_interval_ms: u64,
    /// Wall-clock limit for one submission cycle.
    pub run_timeout_mins: u64,
    pub cancel_poll_interval_ms: u64,
    pub cancel_timeout_mins: u64,
    /// Total submissions allowed for one batch when the job keeps hanging.
    pub max_run_retries: u32,
    /// Consecutive polls without completed-count progress before a job is
    /// considered hung. Zero disables hang detection.
    pub hang_stall_threshold: u32,
    /// Genuine failures above which gap-filling and reruns are skipped.
    pub max_errors_for_rerun: usize,
    pub max_query_retries: u32,
    pub query_initial_interval_ms: u64,
    /// Explicit rerun rules file. When unset the file is searched for
    /// upwards from the working directory.
    pub rerun_rules_file: Option<PathBuf>,
    pub collect_coverage: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
            run_timeout_mins: 120,
            cancel_poll_interval_ms: 30_000,
            cancel_timeout_mins: 10,
            max_run_retries: 3,
            hang_stall_threshold: 60,
            max_errors_for_rerun: 10,
            max_query_retries: 3,
            query_initial_interval_ms: 30_000,
            rerun_rules_file: None,
            collect_coverage: false,
        }
    }
}

impl RunnerConfig {
    /// Load `batchrun.toml` from the workspace root. A missing file yields
    /// the defaults; a file that does not parse or validate is an error.
    pub fn load(workspace: &Path) -> Result<Self> {
        let path = workspace.join(CONFIG_FILE);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Ok(Self::default());
        };
        Self::from_toml(&content)
            .map_err(|e| RunError::general(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: RunnerConfig = toml::from_str(content)
            .map_err(|e| RunError::general(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(RunError::general("poll-interval-ms must be greater than zero"));
        }
        if self.cancel_poll_interval_ms == 0 {
            return Err(RunError::general(
                "cancel-poll-interval-ms must be greater than zero",
            ));
        }
        for (name, mins) in [
            ("run-timeout-mins", self.run_timeout_mins),
            ("cancel-timeout-mins", self.cancel_timeout_mins),
        ] {
            if mins > MAX_TIMEOUT_MINS {
                return Err(RunError::general(format!(
                    "{name} must be at most {MAX_TIMEOUT_MINS}"
                )));
            }
        }
        if self.max_run_retries == 0 {
            return Err(RunError::general("max-run-retries must be at least 1"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_mins.saturating_mul(60))
    }

    pub fn cancel_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cancel_poll_interval_ms)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_secs(self.cancel_timeout_mins.saturating_mul(60))
    }

    pub fn query_retry(&self) -> QueryRetryPolicy {
        QueryRetryPolicy {
            max_retries: self.max_query_retries,
            initial_delay: Duration::from_millis(self.query_initial_interval_ms),
        }
    }
}

/// Exponential backoff for remote queries: wait `initial_delay`, doubling
/// after each further failure, for at most `max_retries` retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for QueryRetryPolicy {
    fn default() -> Self {
        RunnerConfig::default().query_retry()
    }
}

impl QueryRetryPolicy {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Delay before retry number `retry` (zero based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Walk from `start` up to the filesystem root looking for `file_name`.
/// The first match wins.
pub fn find_upwards(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}
