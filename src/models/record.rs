use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::RunStatus;

/// Identifier the remote service assigns to a submitted batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Counters for one submission cycle, or the merge of several.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub status: RunStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub test_time_ms: u64,
    pub classes_enqueued: u64,
    pub classes_completed: u64,
    pub methods_enqueued: u64,
    pub methods_completed: u64,
    pub methods_failed: u64,
}

impl RunRecord {
    /// Fold a later cycle into this aggregate. Counters add; status and end
    /// time come from `next`, the start time stays the earliest seen.
    #[must_use]
    pub fn merge(&self, next: &RunRecord) -> RunRecord {
        let start_time = match (self.start_time, next.start_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        RunRecord {
            status: next.status,
            start_time,
            end_time: next.end_time.or(self.end_time),
            test_time_ms: self.test_time_ms + next.test_time_ms,
            classes_enqueued: self.classes_enqueued + next.classes_enqueued,
            classes_completed: self.classes_completed + next.classes_completed,
            methods_enqueued: self.methods_enqueued + next.methods_enqueued,
            methods_completed: self.methods_completed + next.methods_completed,
            methods_failed: self.methods_failed + next.methods_failed,
        }
    }

    /// Merge a sequence of cycle records in order. `None` when empty.
    pub fn merge_all<'a>(records: impl IntoIterator<Item = &'a RunRecord>) -> Option<RunRecord> {
        records.into_iter().fold(None, |acc, r| {
            Some(match acc {
                None => r.clone(),
                Some(prev) => prev.merge(r),
            })
        })
    }
}
