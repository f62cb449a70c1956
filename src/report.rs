use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::models::{CoverageAggregate, Rerun, ResultStore, RunRecord, TestResult};

/// Output generator run once over the finalized results.
pub trait Reporter: Send + Sync {
    fn generate(&self, store: &ResultStore) -> Result<()>;

    /// Display name for this reporter (e.g., "JSON").
    fn name(&self) -> &str;
}

/// Writes the finalized store as a single pretty-printed JSON document.
pub struct JsonReporter {
    path: PathBuf,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: Option<&'a RunRecord>,
    cycles: &'a [RunRecord],
    tests: Vec<&'a TestResult>,
    reruns: &'a [Rerun],
    coverage: &'a [CoverageAggregate],
    error: Option<&'a str>,
}

impl JsonReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Reporter for JsonReporter {
    fn generate(&self, store: &ResultStore) -> Result<()> {
        let report = JsonReport {
            summary: store.aggregate(),
            cycles: store.records(),
            tests: store.results().collect(),
            reruns: &store.reruns,
            coverage: &store.coverage,
            error: store.error.as_deref(),
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "JSON"
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{RunStatus, TestCaseId, TestOutcome};

    #[test]
    fn writes_summary_and_tests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/results.json");

        let mut store = ResultStore::default();
        store.merge_record(RunRecord {
            status: RunStatus::Completed,
            methods_completed: 1,
            ..Default::default()
        });
        store.merge_results([TestResult {
            id: TestCaseId::new("FooTest", "m1"),
            outcome: TestOutcome::Pass,
            message: None,
            stack_trace: None,
            run_time_ms: 12,
            completed_at: Utc::now(),
        }]);

        JsonReporter::new(&path).generate(&store).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["summary"]["status"], "Completed");
        assert_eq!(json["summary"]["methods_completed"], 1);
        assert_eq!(json["tests"][0]["id"]["method_name"], "m1");
        assert_eq!(json["tests"][0]["outcome"], "Pass");
        assert!(json["error"].is_null());
    }
}
