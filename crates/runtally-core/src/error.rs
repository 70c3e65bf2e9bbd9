//! Aggregation errors.

use crate::status::TaskStatus;
use thiserror::Error;

/// Errors raised by the run aggregator.
///
/// Task-level failures reported through `buildFailed` events are stored as
/// data on the task record and never surface here.
#[derive(Debug, Error)]
pub enum TallyError {
    /// A task id was registered twice in one run.
    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    /// A second counted terminal event arrived for a task.
    #[error("Task '{id}' already reached terminal status '{status}'")]
    DuplicateTerminalEvent { id: String, status: TaskStatus },

    /// A handle referenced a task the aggregator does not hold.
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// The trace profile could not be copied into place.
    #[error("Failed to place trace profile: {0}")]
    TraceCopy(#[source] std::io::Error),

    /// Writing the summary to the terminal sink failed.
    #[error("Failed to write summary: {0}")]
    SummaryWrite(#[from] std::io::Error),
}
