//! Chrome-trace-format event collection.

use std::env;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use runtally_core::{TraceCollector, TraceSpan};

/// Environment variable overriding where trace files are collected.
const TRACE_DIR_ENV: &str = "RUNTALLY_TRACE_DIR";

/// One entry in the chrome trace event array.
#[derive(Debug, Serialize)]
struct TraceEvent<'a> {
    name: &'a str,
    ph: &'a str,
    pid: u32,
    tid: u64,
    ts: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    dur: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<serde_json::Value>,
}

struct TracerInner {
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    events: usize,
    next_tid: u64,
}

/// Trace collector writing chrome trace events to a file.
///
/// Collection starts disabled; spans opened before [`enable`] are
/// dropped. All methods are safe to call from concurrent workers.
///
/// [`enable`]: TraceCollector::enable
pub struct ChromeTracer {
    inner: Arc<Mutex<TracerInner>>,
    origin: Instant,
    dir: Option<PathBuf>,
}

impl ChromeTracer {
    /// Create a disabled collector writing under `$RUNTALLY_TRACE_DIR`
    /// (or the system temp directory).
    pub fn new() -> Self {
        Self::with_dir_option(None)
    }

    /// Create a disabled collector writing under `dir`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self::with_dir_option(Some(dir.into()))
    }

    fn with_dir_option(dir: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TracerInner {
                path: None,
                writer: None,
                events: 0,
                next_tid: 1,
            })),
            origin: Instant::now(),
            dir,
        }
    }

    fn trace_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        match env::var(TRACE_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => env::temp_dir().join("runtally-trace"),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, TracerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_file(&self, inner: &mut TracerInner) -> io::Result<()> {
        let dir = self.trace_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!(
            "runtally-{}-{}.trace",
            std::process::id(),
            chrono::Utc::now().timestamp_millis()
        ));

        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_all(b"[\n")?;

        let meta = TraceEvent {
            name: "process_name",
            ph: "M",
            pid: std::process::id(),
            tid: 0,
            ts: 0,
            dur: None,
            args: Some(serde_json::json!({ "name": "runtally" })),
        };
        serde_json::to_writer(&mut writer, &meta)?;

        inner.path = Some(path);
        inner.writer = Some(writer);
        inner.events = 1;
        Ok(())
    }
}

impl Default for ChromeTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceCollector for ChromeTracer {
    fn enable(&self) {
        let mut inner = self.lock_inner();
        if inner.path.is_some() {
            return;
        }
        if let Err(err) = self.open_file(&mut inner) {
            // Collection stays disabled; the run itself is unaffected.
            warn!(error = %err, "could not open trace file, tracing disabled");
            inner.path = None;
            inner.writer = None;
        } else if let Some(path) = &inner.path {
            debug!(path = %path.display(), "trace collection enabled");
        }
    }

    fn event(&self, name: &str) -> Box<dyn TraceSpan> {
        let mut inner = self.lock_inner();
        if inner.writer.is_none() {
            return Box::new(NoopSpan);
        }
        let tid = inner.next_tid;
        inner.next_tid += 1;
        Box::new(PendingSpan {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
            tid,
            origin: self.origin,
            start_us: self.origin.elapsed().as_micros(),
        })
    }

    fn close(&self) -> io::Result<()> {
        let mut inner = self.lock_inner();
        let Some(mut writer) = inner.writer.take() else {
            return Ok(());
        };
        writer.write_all(b"\n]\n")?;
        writer.flush()
    }

    fn resolved_path(&self) -> Option<PathBuf> {
        self.lock_inner().path.clone()
    }
}

/// Span handed out while collection is disabled.
struct NoopSpan;

impl TraceSpan for NoopSpan {
    fn done(self: Box<Self>) {}
}

/// Open span for one task; `done` appends a complete event.
struct PendingSpan {
    inner: Arc<Mutex<TracerInner>>,
    name: String,
    tid: u64,
    origin: Instant,
    start_us: u128,
}

impl TraceSpan for PendingSpan {
    fn done(self: Box<Self>) {
        let end_us = self.origin.elapsed().as_micros();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let events = inner.events;
        let Some(writer) = inner.writer.as_mut() else {
            // Closed while the span was open; nothing left to record to.
            return;
        };

        let event = TraceEvent {
            name: &self.name,
            ph: "X",
            pid: std::process::id(),
            tid: self.tid,
            ts: self.start_us,
            dur: Some(end_us.saturating_sub(self.start_us)),
            args: None,
        };

        let result = (|| -> io::Result<()> {
            if events > 0 {
                writer.write_all(b",\n")?;
            }
            serde_json::to_writer(&mut *writer, &event)?;
            Ok(())
        })();

        match result {
            Ok(()) => inner.events += 1,
            Err(err) => warn!(error = %err, span = %self.name, "failed to record trace span"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_disabled_collector_is_inert() {
        let tracer = ChromeTracer::new();
        let span = tracer.event("a");
        span.done();
        assert!(tracer.resolved_path().is_none());
        assert!(tracer.close().is_ok());
    }

    #[test]
    fn test_profile_parses_as_json_array() {
        let dir = tempdir().unwrap();
        let tracer = ChromeTracer::with_dir(dir.path());
        tracer.enable();

        let span = tracer.event("web#build");
        span.done();
        tracer.close().unwrap();

        let path = tracer.resolved_path().unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();

        let events = parsed.as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["ph"], "M");
        assert_eq!(events[1]["name"], "web#build");
        assert_eq!(events[1]["ph"], "X");
    }

    #[test]
    fn test_enable_is_idempotent() {
        let dir = tempdir().unwrap();
        let tracer = ChromeTracer::with_dir(dir.path());
        tracer.enable();
        let first = tracer.resolved_path().unwrap();
        tracer.enable();
        assert_eq!(tracer.resolved_path().unwrap(), first);
    }

    #[test]
    fn test_span_after_close_is_dropped() {
        let dir = tempdir().unwrap();
        let tracer = ChromeTracer::with_dir(dir.path());
        tracer.enable();

        let span = tracer.event("late");
        tracer.close().unwrap();
        span.done();

        let contents = fs::read_to_string(tracer.resolved_path().unwrap()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempdir().unwrap();
        let tracer = ChromeTracer::with_dir(dir.path());
        tracer.enable();
        tracer.close().unwrap();
        tracer.close().unwrap();
    }

    #[test]
    fn test_spans_get_distinct_lanes() {
        let dir = tempdir().unwrap();
        let tracer = ChromeTracer::with_dir(dir.path());
        tracer.enable();

        tracer.event("a").done();
        tracer.event("b").done();
        tracer.close().unwrap();

        let contents = fs::read_to_string(tracer.resolved_path().unwrap()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        let events = parsed.as_array().unwrap();
        assert_ne!(events[1]["tid"], events[2]["tid"]);
    }
}
