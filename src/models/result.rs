use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Addressable unit of work. The namespace only groups classes; the key
/// used everywhere else is the qualified class plus the method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestCaseId {
    pub namespace: Option<String>,
    pub class_name: String,
    pub method_name: String,
}

impl TestCaseId {
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Class name as it appears in an expected set, e.g. `ns__FooTest`.
    pub fn qualified_class(&self) -> String {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{}__{}", ns, self.class_name),
            _ => self.class_name.clone(),
        }
    }

    /// Stringified identity used as the result store key.
    pub fn key(&self) -> String {
        format!("{}.{}", self.qualified_class(), self.method_name)
    }
}

impl fmt::Display for TestCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TestOutcome {
    Pass,
    #[default]
    Fail,
    CompileFail,
    Skip,
}

impl TestOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TestOutcome::Pass => "pass",
            TestOutcome::Fail => "fail",
            TestOutcome::CompileFail => "compile-fail",
            TestOutcome::Skip => "skip",
        }
    }
}

/// One method's result as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: TestCaseId,
    pub outcome: TestOutcome,
    pub message: Option<String>,
    pub stack_trace: Option<String>,
    pub run_time_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl TestResult {
    pub fn key(&self) -> String {
        self.id.key()
    }

    pub fn is_pass(&self) -> bool {
        self.outcome == TestOutcome::Pass
    }
}
