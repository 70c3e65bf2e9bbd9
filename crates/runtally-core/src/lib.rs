//! Runtally Core
//!
//! Run-result aggregation for a batch task executor. Workers report
//! lifecycle events for independent tasks; the aggregator keeps a
//! race-free tally plus per-task timing and renders a final summary.
//!
//! This crate contains the aggregation protocol only. Everything that
//! touches the outside world goes through narrow collaborator traits:
//! - Terminal output ([`TerminalSink`])
//! - Trace profiles ([`TraceCollector`])
//! - Artifact placement ([`ProfileCopier`])
//!
//! The scheduler that decides what runs, and when, lives elsewhere.

pub mod error;
pub mod event;
pub mod ids;
pub mod sink;
pub mod status;
pub mod summary;
pub mod task;

// Re-export commonly used types
pub use error::TallyError;
pub use event::ExecutionEvent;
pub use ids::TaskId;
pub use sink::{MemorySink, ProfileCopier, SinkLevel, TerminalSink, TraceCollector, TraceSpan};
pub use status::TaskStatus;
pub use summary::{RunReport, RunTally, RunTotals, TaskHandle, FULL_TURBO};
pub use task::TaskExecution;
