//! Drives a batch of remote test cases to one consistent result set, despite
//! a remote service that drops work, stalls and reports completion early.

pub mod config;
pub mod discovery;
pub mod errors;
pub mod events;
pub mod models;
pub mod report;
pub mod runner;

pub use config::{QueryRetryPolicy, RunnerConfig};
pub use errors::{Result, RunError};
pub use events::{EventSender, RunEvent};
pub use runner::{
    AsyncRunner, CancelCoordinator, RemoteExecutor, ResultAggregator, ResultClassifier, RunDriver,
    RunOutcome, RunStats, TestDiscovery,
};
