//! Trace-profile collaborators for runtally.
//!
//! [`ChromeTracer`] collects per-task spans into a chrome-trace-format
//! file (loadable in `chrome://tracing` and compatible viewers);
//! [`FsProfileCopier`] places the finished profile where the run asked
//! for it. Both degrade gracefully: a broken trace never fails a run.

pub mod collector;
pub mod copier;

pub use collector::ChromeTracer;
pub use copier::FsProfileCopier;
