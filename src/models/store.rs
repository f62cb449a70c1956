use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::coverage::CoverageAggregate;
use super::record::RunRecord;
use super::result::TestResult;

/// A test that was rerun on its own, with its state before and after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rerun {
    pub before: TestResult,
    pub after: TestResult,
}

/// Everything one invocation has learned so far. Owned by the driver and
/// only changed through the merge methods below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultStore {
    results: BTreeMap<String, TestResult>,
    records: Vec<RunRecord>,
    aggregate: Option<RunRecord>,
    pub reruns: Vec<Rerun>,
    pub coverage: Vec<CoverageAggregate>,
    pub error: Option<String>,
}

impl ResultStore {
    /// Later results for the same id replace earlier ones.
    pub fn merge_results(&mut self, results: impl IntoIterator<Item = TestResult>) {
        for result in results {
            self.results.insert(result.key(), result);
        }
    }

    pub fn merge_record(&mut self, record: RunRecord) {
        self.aggregate = RunRecord::merge_all(self.aggregate.iter().chain([&record]));
        self.records.push(record);
    }

    pub fn replace(&mut self, result: TestResult) {
        self.results.insert(result.key(), result);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.results.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&TestResult> {
        self.results.get(key)
    }

    pub fn results(&self) -> impl Iterator<Item = &TestResult> {
        self.results.values()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Per-cycle records in the order they were observed.
    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn aggregate(&self) -> Option<&RunRecord> {
        self.aggregate.as_ref()
    }

    /// Distinct qualified test class names with at least one result.
    pub fn test_classes(&self) -> Vec<String> {
        self.results
            .values()
            .map(|r| r.id.qualified_class())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
