//! Per-task execution records.

use crate::event::ExecutionEvent;
use crate::ids::TaskId;
use crate::status::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution record for a single task in a run.
///
/// Created when the task begins, mutated in place as events arrive. All
/// mutation happens under the aggregator's lock; callers only ever see
/// snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecution {
    /// Unique task identifier.
    pub id: TaskId,

    /// When the task began.
    pub start: DateTime<Utc>,

    /// Wall-clock time since `start`, recomputed on every event.
    pub duration_ms: i64,

    /// Current lifecycle status.
    pub status: TaskStatus,

    /// Failure detail, populated for failure statuses.
    pub error: Option<String>,

    /// Exit code of the underlying process. Forced to 0 on success.
    pub exit_code: i32,
}

impl TaskExecution {
    /// Create a fresh record in the `building` state.
    pub fn new(id: TaskId, start: DateTime<Utc>) -> Self {
        Self {
            id,
            start,
            duration_ms: 0,
            status: TaskStatus::Building,
            error: None,
            exit_code: 0,
        }
    }

    /// Apply one event to this record.
    ///
    /// The stored error is overwritten by any event that carries one and
    /// cleared by a non-failure event, except once the record has
    /// terminally failed: failure detail survives later informational
    /// events.
    pub fn apply(&mut self, event: &ExecutionEvent, now: DateTime<Utc>) {
        let failed_already = self.status == TaskStatus::BuildFailed;

        self.status = event.status;
        self.duration_ms = (now - self.start).num_milliseconds();

        match (&event.error, failed_already) {
            (Some(error), _) => self.error = Some(error.clone()),
            (None, true) => {}
            (None, false) => self.error = None,
        }

        if let Some(exit_code) = event.exit_code {
            self.exit_code = exit_code;
        }
        if event.status == TaskStatus::Built {
            // A built task succeeded no matter what exit code was supplied.
            self.exit_code = 0;
        }
    }
}
