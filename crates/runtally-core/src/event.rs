//! Execution events reported by task executors.

use crate::status::TaskStatus;
use serde::{Deserialize, Serialize};

/// A single lifecycle notification for one task.
///
/// The error payload is the outcome of the work being tracked, not a fault
/// in the aggregator; it is stored on the task record, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEvent {
    /// Status the task transitioned to.
    pub status: TaskStatus,
    /// Error detail, populated for failure events.
    pub error: Option<String>,
    /// Exit code of the underlying process, if one was observed.
    pub exit_code: Option<i32>,
}

impl ExecutionEvent {
    /// Create an event with no error and no exit code.
    pub fn new(status: TaskStatus) -> Self {
        Self {
            status,
            error: None,
            exit_code: None,
        }
    }

    /// Create a `building` event.
    pub fn building() -> Self {
        Self::new(TaskStatus::Building)
    }

    /// Create a `buildStopped` event.
    pub fn stopped() -> Self {
        Self::new(TaskStatus::BuildStopped)
    }

    /// Create a `built` event.
    pub fn built() -> Self {
        Self::new(TaskStatus::Built)
    }

    /// Create a `cached` event.
    pub fn cached() -> Self {
        Self::new(TaskStatus::Cached)
    }

    /// Create a `buildFailed` event carrying the failure detail.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::BuildFailed,
            error: Some(error.into()),
            exit_code: None,
        }
    }

    /// Builder method to attach an observed exit code.
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }
}
