//! Collaborator traits at the aggregator's boundary.
//!
//! The aggregator formats summary lines as `${TAG}` markup template
//! strings and leaves color rendering, trace persistence, and file
//! placement to implementations of these traits.

use std::io;
use std::path::{Path, PathBuf};

/// Where summary lines are written.
pub trait TerminalSink {
    /// Write a normal output line.
    fn output(&mut self, line: &str) -> io::Result<()>;

    /// Write a warning line.
    fn warn(&mut self, line: &str) -> io::Result<()>;

    /// Write an error line.
    fn error(&mut self, line: &str) -> io::Result<()>;
}

/// One open span in a trace profile.
pub trait TraceSpan: Send {
    /// End the span, recording it in the profile.
    fn done(self: Box<Self>);
}

/// Trace-profile collaborator.
///
/// Collectors start disabled; spans opened before [`enable`](Self::enable)
/// are dropped. Failures in a collector degrade the run report, never the
/// run itself.
pub trait TraceCollector: Send + Sync {
    /// Start collecting trace events.
    fn enable(&self);

    /// Open a span for one task.
    fn event(&self, name: &str) -> Box<dyn TraceSpan>;

    /// Flush and terminate the profile.
    fn close(&self) -> io::Result<()>;

    /// Path of the collected profile, once enabled.
    fn resolved_path(&self) -> Option<PathBuf>;
}

/// Copies the finished trace profile into place.
pub trait ProfileCopier {
    /// Copy `src` to `dest`.
    fn copy(&self, src: &Path, dest: &Path) -> io::Result<()>;
}

/// In-memory [`TerminalSink`] capturing tagged lines.
///
/// Useful for embedders that post-process the summary and for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Vec<(SinkLevel, String)>,
}

/// Severity of a captured line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkLevel {
    Output,
    Warn,
    Error,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured lines in write order.
    pub fn lines(&self) -> &[(SinkLevel, String)] {
        &self.lines
    }

    /// Captured lines of one severity.
    pub fn lines_at(&self, level: SinkLevel) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, line)| line.as_str())
            .collect()
    }

    /// True if any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|(_, line)| line.contains(needle))
    }
}

impl TerminalSink for MemorySink {
    fn output(&mut self, line: &str) -> io::Result<()> {
        self.lines.push((SinkLevel::Output, line.to_string()));
        Ok(())
    }

    fn warn(&mut self, line: &str) -> io::Result<()> {
        self.lines.push((SinkLevel::Warn, line.to_string()));
        Ok(())
    }

    fn error(&mut self, line: &str) -> io::Result<()> {
        self.lines.push((SinkLevel::Error, line.to_string()));
        Ok(())
    }
}
