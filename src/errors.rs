use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = RunError> = std::result::Result<T, E>;

/// Failures surfaced by the orchestration layer.
#[derive(Debug, Error)]
pub enum RunError {
    /// A remote query failed, possibly after exhausting its retries.
    #[error("{stage} query failed: {source}")]
    Query {
        stage: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A run poll or cancel poll exceeded its own limit. Never retried.
    #[error("{operation} for job {job_id} timed out after {limit:?}")]
    Timeout {
        operation: &'static str,
        job_id: String,
        limit: Duration,
    },

    /// The job hung on every submission the hang-retry budget allowed.
    #[error("job {job_id} hung {attempts} times, giving up")]
    RetryExhausted { job_id: String, attempts: u32 },

    /// Invariant violations: wrong record count, unknown identity, bad configuration.
    #[error("{0}")]
    General(String),
}

impl RunError {
    pub fn query(stage: impl Into<String>, source: anyhow::Error) -> Self {
        RunError::Query {
            stage: stage.into(),
            source: source.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        RunError::General(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RunError::Timeout { .. })
    }
}
