use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::find_upwards;
use crate::models::{TestOutcome, TestResult};

/// Rules file searched for upwards from the working directory.
pub const RERUN_RULES_FILE: &str = "rerun-patterns.toml";

/// Contention failures used when no rules file is found.
pub const DEFAULT_RERUN_PATTERNS: [&str; 2] = [
    "UNABLE_TO_LOCK_ROW",
    "deadlock detected while waiting for resource",
];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RerunRules {
    #[serde(default)]
    patterns: Vec<String>,
}

/// Results of one classification pass. Skipped tests land in none of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedResults {
    pub passed: Vec<TestResult>,
    pub retryable: Vec<TestResult>,
    pub genuinely_failed: Vec<TestResult>,
}

/// Decides which failures look like transient contention worth a rerun.
#[derive(Debug, Clone)]
pub struct ResultClassifier {
    patterns: Vec<String>,
    combined: Option<Regex>,
}

impl ResultClassifier {
    /// Compile `patterns` in order. Invalid ones are logged and left out.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut valid = Vec::new();
        for pattern in patterns {
            let pattern = pattern.into();
            match Regex::new(&pattern) {
                Ok(_) => valid.push(pattern),
                Err(e) => warn!(%pattern, error = %e, "ignoring invalid rerun pattern"),
            }
        }

        let combined = if valid.is_empty() {
            None
        } else {
            let alternation = valid
                .iter()
                .map(|p| format!("(?:{})", p))
                .collect::<Vec<_>>()
                .join("|");
            match Regex::new(&alternation) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(error = %e, "rerun patterns could not be combined, disabling reruns");
                    None
                }
            }
        };

        Self {
            patterns: valid,
            combined,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_RERUN_PATTERNS)
    }

    /// Load patterns from `path`. An unreadable or malformed file falls back
    /// to the built-in patterns.
    pub fn from_file(path: &Path) -> Self {
        let rules = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| toml::from_str::<RerunRules>(&content).map_err(|e| e.to_string()));
        match rules {
            Ok(rules) => {
                debug!(path = %path.display(), count = rules.patterns.len(), "loaded rerun patterns");
                Self::new(rules.patterns)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read rerun rules, using defaults");
                Self::with_defaults()
            }
        }
    }

    /// Search from `start` up to the filesystem root for the rules file.
    pub fn discover(start: &Path) -> Self {
        match find_upwards(start, RERUN_RULES_FILE) {
            Some(path) => Self::from_file(&path),
            None => Self::with_defaults(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn does_match_any(&self, message: &str) -> bool {
        self.combined.as_ref().is_some_and(|re| re.is_match(message))
    }

    pub fn is_retryable(&self, result: &TestResult) -> bool {
        !matches!(result.outcome, TestOutcome::Pass | TestOutcome::Skip)
            && result
                .message
                .as_deref()
                .is_some_and(|m| self.does_match_any(m))
    }

    pub fn group_records<'a>(&self, results: impl IntoIterator<Item = &'a TestResult>) -> GroupedResults {
        let mut groups = GroupedResults::default();
        for result in results {
            match result.outcome {
                TestOutcome::Skip => {}
                TestOutcome::Pass => groups.passed.push(result.clone()),
                _ if self.is_retryable(result) => groups.retryable.push(result.clone()),
                _ => groups.genuinely_failed.push(result.clone()),
            }
        }
        groups
    }
}

impl Default for ResultClassifier {
    fn default() -> Self {
        Self::with_defaults()
    }
}
