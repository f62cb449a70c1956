use tokio::sync::mpsc;

use crate::models::{JobId, RunRecord, TestCaseId, TestOutcome, TestResult};

pub type EventSender = mpsc::UnboundedSender<RunEvent>;

/// Progress streamed to an optional observer. Purely informational: the
/// orchestration never waits on, or branches on, whoever is listening.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Submitted {
        job_id: JobId,
        items: usize,
    },
    Polled {
        job_id: JobId,
        record: RunRecord,
    },
    /// A result observed for the first time in the current cycle.
    TestFinished {
        result: TestResult,
    },
    Hung {
        job_id: JobId,
        stalled_polls: u32,
        reset_count: u32,
    },
    Cancelled {
        job_id: JobId,
        work_items: usize,
    },
    CycleFinished {
        job_id: JobId,
        record: RunRecord,
    },
    /// The driver is resubmitting tests that never reported a result.
    GapFill {
        missing: usize,
    },
    Rerun {
        id: TestCaseId,
        outcome: TestOutcome,
    },
}

/// Send to the observer if there is one. A dropped receiver is ignored.
pub(crate) fn emit(events: Option<&EventSender>, event: RunEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}
