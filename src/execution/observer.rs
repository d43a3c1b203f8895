use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::output::OutputFormat;

/// Engine-observable lifecycle of one `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Execution events emitted by the engine.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    StateChanged { from: RunState, to: RunState },
    PlanBuilt { plan: String },
    BatchRead { first_row: u64, row_count: usize },
    ThrottleWaited { duration: Duration },
    ChunkStarted { start_row: u64, row_count: usize },
    ChunkFinished { kept_rows: usize },
    BatchWritten { format: OutputFormat, rows: usize },
    StatsComputed { input_rows: u64, output_rows: u64 },
    RunFinished {
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// A simple stderr logger for execution events.
#[derive(Default)]
pub struct StdErrExecutionObserver;

impl ExecutionObserver for StdErrExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        eprintln!("[clean] {event:?}");
    }
}

/// Counters for a single run.
///
/// A fresh instance is created per `process` call, so concurrent runs never share counters.
#[derive(Default)]
pub(crate) struct ExecutionMetrics {
    rows_read: AtomicU64,
    rows_kept: AtomicU64,
    batches: AtomicU64,
    chunks_started: AtomicU64,
    chunks_finished: AtomicU64,
    throttle_wait_ns: AtomicU64,
    active_chunks: AtomicUsize,
    max_active_chunks: AtomicUsize,
}

impl ExecutionMetrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_batch(&self, rows: usize) {
        let _ = self.batches.fetch_add(1, Ordering::SeqCst);
        let _ = self.rows_read.fetch_add(rows as u64, Ordering::SeqCst);
    }

    pub(crate) fn on_rows_kept(&self, rows: usize) {
        let _ = self.rows_kept.fetch_add(rows as u64, Ordering::SeqCst);
    }

    pub(crate) fn on_chunk_start(&self) {
        let _ = self.chunks_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_chunks.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.max_active_chunks.fetch_max(now, Ordering::SeqCst);
    }

    pub(crate) fn on_chunk_end(&self) {
        let _ = self.chunks_finished.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_chunks.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn on_throttle_wait(&self, d: Duration) {
        let add = d.as_nanos().min(u64::MAX as u128) as u64;
        let _ = self.throttle_wait_ns.fetch_add(add, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self, elapsed: Duration) -> ExecutionMetricsSnapshot {
        ExecutionMetricsSnapshot {
            elapsed,
            rows_read: self.rows_read.load(Ordering::SeqCst),
            rows_kept: self.rows_kept.load(Ordering::SeqCst),
            batches: self.batches.load(Ordering::SeqCst),
            chunks_started: self.chunks_started.load(Ordering::SeqCst),
            chunks_finished: self.chunks_finished.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
            max_active_chunks: self.max_active_chunks.load(Ordering::SeqCst),
        }
    }
}

/// Immutable snapshot of a run's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub elapsed: Duration,
    pub rows_read: u64,
    pub rows_kept: u64,
    pub batches: u64,
    pub chunks_started: u64,
    pub chunks_finished: u64,
    pub throttle_wait: Duration,
    pub max_active_chunks: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows={}/{} batches={}, chunks={}/{}, max_active_chunks={}, throttle_wait={:?}, elapsed={:?}",
            self.rows_kept,
            self.rows_read,
            self.batches,
            self.chunks_finished,
            self.chunks_started,
            self.max_active_chunks,
            self.throttle_wait,
            self.elapsed
        )
    }
}
