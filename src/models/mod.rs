pub mod coverage;
pub mod expected;
pub mod record;
pub mod result;
pub mod status;
pub mod store;

pub use coverage::CoverageAggregate;
pub use expected::{ExpectedSet, TestItem};
pub use record::{JobId, RunRecord};
pub use result::{TestCaseId, TestOutcome, TestResult};
pub use status::RunStatus;
pub use store::{Rerun, ResultStore};
