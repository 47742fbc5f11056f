use std::fmt;

use serde::Serialize;

use crate::types::ChangeUnitKey;

/// Executor lifecycle: `Idle -> AcquiringLock -> Running -> Releasing -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Idle,
    AcquiringLock,
    Running,
    Releasing,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "IDLE",
            Self::AcquiringLock => "ACQUIRING_LOCK",
            Self::Running => "RUNNING",
            Self::Releasing => "RELEASING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub execution_id: String,
    pub state: RunState,
    /// False when the run was disabled or another process held the lock.
    pub lock_obtained: bool,
    /// Executed units, in execution order.
    pub executed: Vec<ChangeUnitKey>,
    /// Units skipped because they already ran.
    pub skipped: Vec<ChangeUnitKey>,
    /// Units outside the configured system-version bounds.
    pub out_of_range: Vec<ChangeUnitKey>,
    pub legacy_imported: usize,
    pub elapsed_ms: u64,
}

impl MigrationReport {
    pub(crate) fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            state: RunState::Idle,
            lock_obtained: false,
            executed: Vec::new(),
            skipped: Vec::new(),
            out_of_range: Vec::new(),
            legacy_imported: 0,
            elapsed_ms: 0,
        }
    }

    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }
}
