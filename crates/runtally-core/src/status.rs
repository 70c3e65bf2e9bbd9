//! Lifecycle status for tracked tasks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a task as reported by its executor.
///
/// A task starts out `Building` and usually ends in one of the counted
/// terminal statuses (`Built`, `Cached`, `BuildFailed`). `BuildStopped`
/// marks a task that was halted before producing a result; it is not
/// counted as attempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Task execution is in progress.
    #[default]
    Building,
    /// Task was halted before reaching a result.
    BuildStopped,
    /// Task finished successfully.
    Built,
    /// Task result was served from cache.
    Cached,
    /// Task finished with a failure.
    BuildFailed,
}

impl TaskStatus {
    /// Returns true for the terminal statuses that count toward the run
    /// totals. Exactly one such status may be recorded per task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Built | Self::Cached | Self::BuildFailed)
    }

    /// The wire/report name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::BuildStopped => "buildStopped",
            Self::Built => "built",
            Self::Cached => "cached",
            Self::BuildFailed => "buildFailed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
