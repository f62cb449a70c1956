/// Hang detection state for one run, recomputed on every poll.
///
/// Each update returns a new value, so a sequence of completed counts can be
/// replayed against it directly in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub progress_threshold: u32,
    pub last_completed: u64,
    pub stall_count: u32,
    pub reset_count: u32,
}

impl RunStats {
    pub fn new(progress_threshold: u32) -> Self {
        Self {
            progress_threshold,
            last_completed: 0,
            stall_count: 0,
            reset_count: 0,
        }
    }

    /// Fold in the completed-method count from the latest poll.
    #[must_use]
    pub fn update(self, completed: u64) -> Self {
        if completed == self.last_completed {
            Self {
                stall_count: self.stall_count.saturating_add(1),
                ..self
            }
        } else {
            Self {
                last_completed: completed,
                stall_count: 0,
                ..self
            }
        }
    }

    /// True on exactly the poll where the stall count reaches the threshold.
    pub fn is_hung(&self) -> bool {
        self.progress_threshold > 0 && self.stall_count == self.progress_threshold
    }

    /// Fresh tracking for a resubmitted job; remembers how many resets happened.
    #[must_use]
    pub fn reset(self) -> Self {
        Self {
            last_completed: 0,
            stall_count: 0,
            reset_count: self.reset_count + 1,
            ..self
        }
    }
}
