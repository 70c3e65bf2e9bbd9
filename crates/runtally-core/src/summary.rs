//! The run aggregator: shared counters, task records, and the final summary.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::TallyError;
use crate::event::ExecutionEvent;
use crate::ids::TaskId;
use crate::sink::{ProfileCopier, TerminalSink, TraceCollector, TraceSpan};
use crate::status::TaskStatus;
use crate::task::TaskExecution;

/// Celebratory marker shown when every attempted task came from cache.
pub const FULL_TURBO: &str = ">>> FULL TURBO";

/// Counter snapshot for one run.
///
/// `attempted == succeeded + failed + cached` holds after every completed
/// record call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    /// Tasks that finished successfully.
    pub succeeded: u32,
    /// Tasks that finished with a failure.
    pub failed: u32,
    /// Tasks served from cache.
    pub cached: u32,
    /// Tasks that reached any counted terminal status.
    pub attempted: u32,
}

impl RunTotals {
    /// Tasks that produced a usable result.
    pub fn successful(&self) -> u32 {
        self.succeeded + self.cached
    }

    /// True when every attempted task was served from cache.
    pub fn full_turbo(&self) -> bool {
        self.attempted > 0 && self.cached == self.attempted
    }
}

/// Serializable snapshot of one run, tasks sorted by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// When the run began.
    pub started_at: DateTime<Utc>,
    /// Final counters.
    pub totals: RunTotals,
    /// Per-task records in id order.
    pub tasks: Vec<TaskExecution>,
}

struct TallyState {
    tasks: HashMap<TaskId, TaskExecution>,
    totals: RunTotals,
}

/// Aggregated outcome of one batch run.
///
/// One instance exists per run. Construct it in the run's entry point and
/// hand a clone of the `Arc` to every worker; workers report through
/// [`TaskHandle`]s obtained from [`begin`](Self::begin). A single mutex
/// serializes every mutation of the counters and the task records.
pub struct RunTally {
    state: Mutex<TallyState>,
    started_at: DateTime<Utc>,
    profile_name: Option<String>,
    tracer: Option<Arc<dyn TraceCollector>>,
}

impl RunTally {
    /// Create an aggregator for a run that started at `started_at`.
    ///
    /// A non-empty `profile_name` activates the attached trace collector;
    /// the finished profile is copied to that name during
    /// [`finish`](Self::finish).
    pub fn new(
        started_at: DateTime<Utc>,
        profile_name: Option<String>,
        tracer: Option<Arc<dyn TraceCollector>>,
    ) -> Arc<Self> {
        if let (Some(name), Some(tracer)) = (&profile_name, &tracer) {
            if !name.is_empty() {
                tracer.enable();
            }
        }

        Arc::new(Self {
            state: Mutex::new(TallyState {
                tasks: HashMap::new(),
                totals: RunTotals::default(),
            }),
            started_at,
            profile_name,
            tracer,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, TallyState> {
        // Every guarded section completes its field writes before
        // unwinding is possible, so a poisoned lock still holds
        // consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a task and return the handle its executor reports through.
    ///
    /// Fails with [`TallyError::DuplicateTask`] if the id is already
    /// registered in this run.
    pub fn begin(self: &Arc<Self>, id: TaskId) -> Result<TaskHandle, TallyError> {
        let start = Utc::now();
        {
            let mut state = self.lock_state();
            if state.tasks.contains_key(&id) {
                return Err(TallyError::DuplicateTask(id.into_inner()));
            }
            state
                .tasks
                .insert(id.clone(), TaskExecution::new(id.clone(), start));
        }

        let span = self.tracer.as_ref().map(|t| t.event(id.as_str()));
        debug!(task = %id, "task registered");

        let mut handle = TaskHandle {
            tally: Arc::clone(self),
            id,
            span,
        };
        handle.record(ExecutionEvent::building())?;
        Ok(handle)
    }

    /// Copy of the current counters.
    pub fn totals(&self) -> RunTotals {
        self.lock_state().totals
    }

    /// Snapshot of one task's record.
    pub fn task(&self, id: &TaskId) -> Option<TaskExecution> {
        self.lock_state().tasks.get(id).cloned()
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.lock_state().tasks.len()
    }

    /// When the run began.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Serializable snapshot with tasks sorted by id for reproducible
    /// output.
    pub fn report(&self) -> RunReport {
        let state = self.lock_state();
        let mut tasks: Vec<TaskExecution> = state.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        RunReport {
            started_at: self.started_at,
            totals: state.totals,
            tasks,
        }
    }

    /// Render the final summary and place the trace profile.
    ///
    /// Must run only after every worker holding a [`TaskHandle`] has
    /// finished and joined; the caller provides that barrier. The summary
    /// is rendered even when trace placement fails; only a broken terminal
    /// sink aborts early.
    pub fn finish(
        &self,
        terminal: &mut dyn TerminalSink,
        copier: &dyn ProfileCopier,
    ) -> Result<(), TallyError> {
        let trace_result = self.place_trace_profile(terminal, copier);
        if matches!(trace_result, Err(TallyError::SummaryWrite(_))) {
            return trace_result;
        }
        if let Err(err) = &trace_result {
            terminal.error(&format!("Error writing trace profile: {err}"))?;
        }

        let totals = self.totals();
        let marker = if totals.full_turbo() {
            full_turbo_marker(env::var("TERM_PROGRAM").ok().as_deref())
        } else {
            String::new()
        };

        if totals.attempted == 0 {
            terminal.output("")?;
            terminal.warn("No tasks were executed as part of this run.")?;
        }

        let elapsed_ms = (Utc::now() - self.started_at).num_milliseconds();
        terminal.output("")?;
        terminal.output(&format!(
            "${{BOLD}} Tasks:${{BOLD_GREEN}}    {} successful${{RESET}}${{GRAY}}, {} total${{RESET}}",
            totals.successful(),
            totals.attempted
        ))?;
        terminal.output(&format!(
            "${{BOLD}}Cached:    {} cached${{RESET}}${{GRAY}}, {} total${{RESET}}",
            totals.cached, totals.attempted
        ))?;
        terminal.output(&format!(
            "${{BOLD}}  Time:    {}${{RESET}} {}",
            format_elapsed(elapsed_ms),
            marker
        ))?;
        terminal.output("")?;

        trace_result
    }

    fn place_trace_profile(
        &self,
        terminal: &mut dyn TerminalSink,
        copier: &dyn ProfileCopier,
    ) -> Result<(), TallyError> {
        let Some(tracer) = &self.tracer else {
            return Ok(());
        };
        // No resolved path means tracing was never enabled.
        let Some(src) = tracer.resolved_path() else {
            return Ok(());
        };

        if let Err(err) = tracer.close() {
            warn!(error = %err, "failed to flush trace data");
            terminal.warn(&format!("Failed to flush trace data: {err}"))?;
        }

        let dest = match self.profile_name.as_deref() {
            Some(name) if !name.is_empty() => PathBuf::from(name),
            _ => PathBuf::from(format!(
                "runtally-{}.trace",
                self.started_at.format("%Y-%m-%dT%H-%M-%S")
            )),
        };
        copier.copy(&src, &dest).map_err(TallyError::TraceCopy)?;
        debug!(profile = %dest.display(), "trace profile written");
        Ok(())
    }
}

/// Handle through which one executor reports a task's lifecycle events.
///
/// Obtained from [`RunTally::begin`]; each worker owns exactly one handle
/// per task. The record it points at may only change through
/// [`record`](Self::record), never by direct field access.
pub struct TaskHandle {
    tally: Arc<RunTally>,
    id: TaskId,
    span: Option<Box<dyn TraceSpan>>,
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("span", &self.span.as_ref().map(|_| "..."))
            .finish()
    }
}

impl TaskHandle {
    /// Id of the task this handle reports for.
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Record one lifecycle event.
    ///
    /// Status, duration, error, exit code, and the run totals move as one
    /// atomic unit relative to every other record call in the run. A
    /// second counted terminal event fails with
    /// [`TallyError::DuplicateTerminalEvent`] before any mutation.
    pub fn record(&mut self, event: ExecutionEvent) -> Result<(), TallyError> {
        let now = Utc::now();
        {
            let mut state = self.tally.lock_state();
            let TallyState { tasks, totals } = &mut *state;
            let record = tasks
                .get_mut(&self.id)
                .ok_or_else(|| TallyError::UnknownTask(self.id.as_str().to_owned()))?;

            if record.status.is_terminal() && event.status.is_terminal() {
                return Err(TallyError::DuplicateTerminalEvent {
                    id: self.id.as_str().to_owned(),
                    status: record.status,
                });
            }

            record.apply(&event, now);

            match event.status {
                TaskStatus::BuildFailed => {
                    totals.failed += 1;
                    totals.attempted += 1;
                }
                TaskStatus::Cached => {
                    totals.cached += 1;
                    totals.attempted += 1;
                }
                TaskStatus::Built => {
                    totals.succeeded += 1;
                    totals.attempted += 1;
                }
                TaskStatus::Building | TaskStatus::BuildStopped => {}
            }
        }

        if event.status.is_terminal() {
            if let Some(span) = self.span.take() {
                span.done();
            }
            debug!(task = %self.id, status = %event.status, "task finished");
        }
        Ok(())
    }

    /// Record a successful completion.
    pub fn built(&mut self) -> Result<(), TallyError> {
        self.record(ExecutionEvent::built())
    }

    /// Record a cache hit.
    pub fn cached(&mut self) -> Result<(), TallyError> {
        self.record(ExecutionEvent::cached())
    }

    /// Record a failure with its detail and observed exit code.
    pub fn failed(
        &mut self,
        error: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Result<(), TallyError> {
        let mut event = ExecutionEvent::failed(error);
        event.exit_code = exit_code;
        self.record(event)
    }

    /// Record that the task was halted before producing a result.
    pub fn stopped(&mut self) -> Result<(), TallyError> {
        self.record(ExecutionEvent::stopped())
    }
}

/// Markup form of the full-turbo marker for the given terminal program.
///
/// Some terminals render the rainbow form as unreadable block colors;
/// those get the bold magenta fallback.
pub fn full_turbo_marker(terminal_program: Option<&str>) -> String {
    if terminal_program == Some("Apple_Terminal") {
        format!("${{BOLD_MAGENTA}}{FULL_TURBO}${{RESET}}")
    } else {
        format!("${{RAINBOW}}{FULL_TURBO}${{RESET}}")
    }
}

/// Format a millisecond duration for the summary's Time line.
pub fn format_elapsed(ms: i64) -> String {
    let ms = ms.max(0);
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.2}s", ms as f64 / 1000.0)
    } else if ms < 3_600_000 {
        let secs = ms / 1000;
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        let mins = ms / 60_000;
        format!("{}h {}m", mins / 60, mins % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use std::path::Path;
    use std::thread;

    struct NullCopier;

    impl ProfileCopier for NullCopier {
        fn copy(&self, _src: &Path, _dest: &Path) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn tally() -> Arc<RunTally> {
        RunTally::new(Utc::now(), None, None)
    }

    fn assert_invariant(totals: &RunTotals) {
        assert_eq!(
            totals.attempted,
            totals.succeeded + totals.failed + totals.cached
        );
    }

    #[test]
    fn test_begin_registers_building_task() {
        let tally = tally();
        let handle = tally.begin(TaskId::new("a")).unwrap();

        let record = tally.task(handle.id()).unwrap();
        assert_eq!(record.status, TaskStatus::Building);
        assert_eq!(tally.task_count(), 1);
        assert_eq!(tally.totals().attempted, 0);
    }

    #[test]
    fn test_duplicate_begin_rejected() {
        let tally = tally();
        let _a = tally.begin(TaskId::new("a")).unwrap();
        let err = tally.begin(TaskId::new("a")).unwrap_err();
        assert!(matches!(err, TallyError::DuplicateTask(_)));
        assert_eq!(tally.task_count(), 1);
    }

    #[test]
    fn test_built_forces_exit_code_zero() {
        let tally = tally();
        let mut handle = tally.begin(TaskId::new("a")).unwrap();
        handle
            .record(ExecutionEvent::built().with_exit_code(3))
            .unwrap();

        let record = tally.task(&TaskId::new("a")).unwrap();
        assert_eq!(record.exit_code, 0);
        assert_eq!(record.status, TaskStatus::Built);
        assert_eq!(tally.totals().succeeded, 1);
    }

    #[test]
    fn test_cached_counts() {
        let tally = tally();
        let mut handle = tally.begin(TaskId::new("a")).unwrap();
        handle.cached().unwrap();

        let totals = tally.totals();
        assert_eq!(totals.cached, 1);
        assert_eq!(totals.attempted, 1);
        assert_eq!(totals.succeeded, 0);
        assert_eq!(totals.failed, 0);
        assert_invariant(&totals);
    }

    #[test]
    fn test_failed_counts_and_keeps_error() {
        let tally = tally();
        let mut handle = tally.begin(TaskId::new("a")).unwrap();
        handle.failed("exit status 1", Some(1)).unwrap();

        let totals = tally.totals();
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.attempted, 1);
        assert_invariant(&totals);

        let record = tally.task(&TaskId::new("a")).unwrap();
        assert_eq!(record.error.as_deref(), Some("exit status 1"));
        assert_eq!(record.exit_code, 1);
    }

    #[test]
    fn test_invariant_holds_after_every_call() {
        let tally = tally();
        let mut a = tally.begin(TaskId::new("a")).unwrap();
        let mut b = tally.begin(TaskId::new("b")).unwrap();
        let mut c = tally.begin(TaskId::new("c")).unwrap();

        assert_invariant(&tally.totals());
        a.built().unwrap();
        assert_invariant(&tally.totals());
        b.cached().unwrap();
        assert_invariant(&tally.totals());
        c.failed("boom", None).unwrap();
        assert_invariant(&tally.totals());

        assert_eq!(tally.totals().attempted, 3);
    }

    #[test]
    fn test_second_terminal_event_rejected() {
        let tally = tally();
        let mut handle = tally.begin(TaskId::new("a")).unwrap();
        handle.built().unwrap();

        let err = handle.cached().unwrap_err();
        assert!(matches!(err, TallyError::DuplicateTerminalEvent { .. }));

        // No double count, record untouched.
        let totals = tally.totals();
        assert_eq!(totals.attempted, 1);
        assert_eq!(totals.cached, 0);
        assert_eq!(
            tally.task(&TaskId::new("a")).unwrap().status,
            TaskStatus::Built
        );
    }

    #[test]
    fn test_stopped_not_counted() {
        let tally = tally();
        let mut handle = tally.begin(TaskId::new("a")).unwrap();
        handle.stopped().unwrap();
        assert_eq!(tally.totals().attempted, 0);

        // A halted task may still resume and finish.
        handle.built().unwrap();
        assert_eq!(tally.totals().attempted, 1);
    }

    #[test]
    fn test_concurrent_records_lose_no_updates() {
        let tally = tally();
        let n = 100;

        let workers: Vec<_> = (0..n)
            .map(|i| {
                let tally = Arc::clone(&tally);
                thread::spawn(move || {
                    let mut handle = tally.begin(TaskId::new(format!("task-{i}"))).unwrap();
                    handle.built().unwrap();
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let totals = tally.totals();
        assert_eq!(totals.succeeded, n);
        assert_eq!(totals.attempted, n);
        assert_invariant(&totals);
        assert_eq!(tally.task_count(), n as usize);
    }

    #[test]
    fn test_finish_zero_attempted_warns() {
        let tally = tally();
        let mut sink = MemorySink::new();
        tally.finish(&mut sink, &NullCopier).unwrap();

        assert!(sink.contains("No tasks were executed as part of this run."));
        assert!(!sink.contains(FULL_TURBO));
    }

    #[test]
    fn test_finish_all_cached_shows_marker() {
        let tally = tally();
        for name in ["a", "b", "c"] {
            let mut handle = tally.begin(TaskId::new(name)).unwrap();
            handle.cached().unwrap();
        }

        let mut sink = MemorySink::new();
        tally.finish(&mut sink, &NullCopier).unwrap();

        assert!(sink.contains(FULL_TURBO));
        assert!(sink.contains("3 successful"));
        assert!(sink.contains("3 cached"));
    }

    #[test]
    fn test_finish_mixed_run_has_no_marker() {
        let tally = tally();
        let mut a = tally.begin(TaskId::new("a")).unwrap();
        a.cached().unwrap();
        let mut b = tally.begin(TaskId::new("b")).unwrap();
        b.built().unwrap();

        let mut sink = MemorySink::new();
        tally.finish(&mut sink, &NullCopier).unwrap();

        assert!(!sink.contains(FULL_TURBO));
        assert!(sink.contains("2 successful"));
    }

    #[test]
    fn test_full_turbo_marker_fallback() {
        let fallback = full_turbo_marker(Some("Apple_Terminal"));
        assert!(fallback.contains("${BOLD_MAGENTA}"));
        assert!(fallback.contains(FULL_TURBO));

        let rainbow = full_turbo_marker(None);
        assert!(rainbow.contains("${RAINBOW}"));
        let rainbow = full_turbo_marker(Some("iTerm.app"));
        assert!(rainbow.contains("${RAINBOW}"));
    }

    #[test]
    fn test_report_sorted_by_id() {
        let tally = tally();
        for name in ["c", "a", "b"] {
            let mut handle = tally.begin(TaskId::new(name)).unwrap();
            handle.built().unwrap();
        }

        let report = tally.report();
        let ids: Vec<_> = report.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(report.totals.succeeded, 3);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(42), "42ms");
        assert_eq!(format_elapsed(1_500), "1.50s");
        assert_eq!(format_elapsed(90_000), "1m 30s");
        assert_eq!(format_elapsed(3_700_000), "1h 1m");
    }
}
