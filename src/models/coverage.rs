use serde::{Deserialize, Serialize};

/// Line coverage for one covered class, summed over every test that touched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageAggregate {
    pub class_id: String,
    pub class_name: String,
    pub lines_covered: u64,
    pub lines_uncovered: u64,
}

impl CoverageAggregate {
    pub fn percent(&self) -> f64 {
        let total = self.lines_covered + self.lines_uncovered;
        if total == 0 {
            0.0
        } else {
            self.lines_covered as f64 * 100.0 / total as f64
        }
    }
}
