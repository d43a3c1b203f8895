//! The cleaning engine: compile a rule tree, stream the input through it, write the survivors.
//!
//! One [`CleaningEngine::process`] call runs an explicit Scan → Filter → Sink pipeline:
//!
//! - the input is resolved to a local file (staged through an [`ObjectStager`] when remote)
//! - a lazy [`CsvScan`] infers the schema from a bounded sample
//! - the rule tree is compiled and bound to that schema
//! - rows are pulled `batch_size` at a time; each batch is filtered in parallel sub-chunks on
//!   the engine's own thread pool, throttled by `max_in_flight_chunks`
//! - survivors are appended to the sink in input order
//! - row counts come from a second streaming pass over the input and the written artifact
//!
//! Any failure aborts the run, removes the partially written output and drops the staged input.

mod observer;
mod plan;
mod semaphore;

use std::fmt;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{EngineResult, RuleResult};
use crate::ingestion::{CsvScan, DEFAULT_INFER_ROWS, RowBatch};
use crate::observability::{ProcessingContext, ProcessingObserver, ProcessingSeverity};
use crate::output::{ColumnarCompression, OutputFormat, count_output_rows, open_sink};
use crate::rules::{BoundPredicate, Predicate, RuleNode, compile, compile_json};
use crate::staging::{InputLocation, ObjectStager, resolve_input};
use crate::types::{Schema, Value};

pub use observer::{
    ExecutionEvent, ExecutionMetricsSnapshot, ExecutionObserver, RunState, StdErrExecutionObserver,
};
pub use plan::{FilterStage, LogicalPlan, SinkSpec};

use observer::ExecutionMetrics;
use semaphore::Semaphore;

/// Configuration for the [`CleaningEngine`].
///
/// Deserializable from JSON; missing keys take their [`Default`] values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Number of worker threads used for filtering.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Rows pulled from the source per batch. Bounds memory use.
    ///
    /// Columnar output also uses it as the row group size.
    pub batch_size: usize,
    /// Rows per parallel filter task within a batch.
    pub chunk_size: usize,
    /// Upper bound on concurrently evaluated chunks, on top of `num_threads`.
    pub max_in_flight_chunks: usize,
    /// Records sampled for schema inference.
    pub infer_schema_rows: usize,
    /// Codec for columnar output.
    pub compression: ColumnarCompression,
    /// Failures at or above this severity also trigger `on_alert`.
    pub alert_at_or_above: ProcessingSeverity,
}

impl Default for EngineOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: None,
            batch_size: 16_384,
            chunk_size: 4_096,
            max_in_flight_chunks: n,
            infer_schema_rows: DEFAULT_INFER_ROWS,
            compression: ColumnarCompression::default(),
            alert_at_or_above: ProcessingSeverity::Critical,
        }
    }
}

/// Row counts and locations of one successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub input_rows: u64,
    pub output_rows: u64,
    /// `input_rows - output_rows`.
    pub rows_filtered: u64,
    /// Input location as supplied by the caller.
    pub input_path: String,
    pub output_path: PathBuf,
}

impl ProcessingStats {
    pub fn new(
        input_rows: u64,
        output_rows: u64,
        input_path: impl Into<String>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_rows,
            output_rows,
            rows_filtered: input_rows.saturating_sub(output_rows),
            input_path: input_path.into(),
            output_path: output_path.into(),
        }
    }
}

/// Rule-driven CSV filtering engine.
///
/// The engine holds configuration and collaborators only; it keeps no per-run state, so one
/// instance can serve concurrent calls from several threads.
///
/// # Examples
///
/// ```no_run
/// use dataset_cleaning::execution::{CleaningEngine, EngineOptions};
/// use dataset_cleaning::output::OutputFormat;
/// use serde_json::json;
///
/// # fn main() -> Result<(), dataset_cleaning::EngineError> {
/// let engine = CleaningEngine::new(EngineOptions::default());
/// let rules = json!({
///     "combinator": "and",
///     "rules": [{"field": "age", "operator": "greater_than_or_equal", "value": 18}]
/// });
/// let stats = engine.process("/data/people.csv", "/data/out/adults.csv", &rules, OutputFormat::Csv)?;
/// println!("kept {} of {} rows", stats.output_rows, stats.input_rows);
/// # Ok(())
/// # }
/// ```
pub struct CleaningEngine {
    pool: ThreadPool,
    opts: EngineOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
    outcome_observer: Option<Arc<dyn ProcessingObserver>>,
    stager: Option<Arc<dyn ObjectStager>>,
}

impl CleaningEngine {
    /// Create a new engine with the given options.
    ///
    /// # Panics
    ///
    /// Panics if `batch_size`, `chunk_size` or `max_in_flight_chunks` is zero, or if
    /// `num_threads == Some(0)`.
    pub fn new(opts: EngineOptions) -> Self {
        assert!(opts.batch_size > 0, "batch_size must be > 0");
        assert!(opts.chunk_size > 0, "chunk_size must be > 0");
        assert!(
            opts.max_in_flight_chunks > 0,
            "max_in_flight_chunks must be > 0"
        );
        if let Some(n) = opts.num_threads {
            assert!(n > 0, "num_threads must be > 0 when set");
        }

        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));
        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("clean-filter-{i}"))
            .build()
            .expect("failed to build rayon thread pool");

        Self {
            pool,
            opts,
            observer: None,
            outcome_observer: None,
            stager: None,
        }
    }

    /// Attach an observer for execution events (plan, batches, chunks, metrics).
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Attach an observer for run outcomes (success, failure, alerts).
    pub fn with_outcome_observer(mut self, observer: Arc<dyn ProcessingObserver>) -> Self {
        self.outcome_observer = Some(observer);
        self
    }

    /// Attach a stager used for inputs that are not local files.
    pub fn with_stager(mut self, stager: Arc<dyn ObjectStager>) -> Self {
        self.stager = Some(stager);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.opts
    }

    /// Filter `input` with a JSON rule tree and write the matching rows to `output`.
    ///
    /// `input` is an absolute local path or a key handed to the configured [`ObjectStager`].
    /// An existing file at `output` is overwritten.
    pub fn process(
        &self,
        input: &str,
        output: impl AsRef<Path>,
        rules: &JsonValue,
        format: OutputFormat,
    ) -> EngineResult<ProcessingStats> {
        self.execute(input, output.as_ref(), format, |schema| compile_json(rules, schema))
    }

    /// Same as [`Self::process`] for an already-parsed rule tree.
    pub fn process_node(
        &self,
        input: &str,
        output: impl AsRef<Path>,
        rules: &RuleNode,
        format: OutputFormat,
    ) -> EngineResult<ProcessingStats> {
        self.execute(input, output.as_ref(), format, |schema| compile(rules, schema))
    }

    fn execute(
        &self,
        input: &str,
        output: &Path,
        format: OutputFormat,
        compile_rules: impl FnOnce(&Schema) -> RuleResult<Predicate>,
    ) -> EngineResult<ProcessingStats> {
        let start = Instant::now();
        let metrics = ExecutionMetrics::new();
        let ctx = ProcessingContext {
            input: input.to_string(),
            output: output.to_path_buf(),
            format,
        };

        log::info!("processing {input} -> {} ({format:?})", output.display());
        self.emit(ExecutionEvent::StateChanged {
            from: RunState::Idle,
            to: RunState::Running,
        });

        let result = self.run(input, output, format, compile_rules, &metrics);

        let to = if result.is_ok() {
            RunState::Succeeded
        } else {
            RunState::Failed
        };
        self.emit(ExecutionEvent::StateChanged {
            from: RunState::Running,
            to,
        });
        let elapsed = start.elapsed();
        let snapshot = metrics.snapshot(elapsed);
        match &result {
            Ok(stats) => log::info!(
                "processed {input}: {} of {} rows kept ({snapshot})",
                stats.output_rows,
                stats.input_rows
            ),
            Err(e) => log::warn!("processing {input} failed: {e}"),
        }
        self.emit(ExecutionEvent::RunFinished {
            elapsed,
            metrics: snapshot,
        });

        self.report(&ctx, &result);
        result
    }

    fn run(
        &self,
        input: &str,
        output: &Path,
        format: OutputFormat,
        compile_rules: impl FnOnce(&Schema) -> RuleResult<Predicate>,
        metrics: &ExecutionMetrics,
    ) -> EngineResult<ProcessingStats> {
        // Held until the end of the run; a staged copy is deleted when this drops.
        let staged = resolve_input(&InputLocation::parse(input), self.stager.as_deref())?;

        let scan = CsvScan::open(staged.path(), self.opts.infer_schema_rows)?;
        let predicate = compile_rules(scan.schema())?;
        let plan = LogicalPlan::new(
            scan,
            predicate,
            SinkSpec {
                path: output.to_path_buf(),
                format,
                compression: self.opts.compression,
                row_group_rows: self.opts.batch_size,
            },
        )?;
        log::debug!("plan: {plan}");
        self.emit(ExecutionEvent::PlanBuilt {
            plan: plan.to_string(),
        });

        let mut partial = PartialOutput::new(plan.output_path());
        let written = self.write_filtered(&plan, metrics)?;

        let input_rows = plan.scan.count_rows()?;
        let output_rows = count_output_rows(plan.output_path(), format)?;
        debug_assert_eq!(written, output_rows);
        self.emit(ExecutionEvent::StatsComputed {
            input_rows,
            output_rows,
        });

        partial.keep();
        Ok(ProcessingStats::new(input_rows, output_rows, input, output))
    }

    fn write_filtered(&self, plan: &LogicalPlan, metrics: &ExecutionMetrics) -> EngineResult<u64> {
        let mut sink = open_sink(
            plan.sink.format,
            &plan.sink.path,
            plan.scan.schema(),
            plan.sink.compression,
            plan.sink.row_group_rows,
        )?;
        let sem = Semaphore::new(self.opts.max_in_flight_chunks);

        for batch in plan.scan.batches(self.opts.batch_size)? {
            let batch = batch?;
            metrics.on_batch(batch.len());
            self.emit(ExecutionEvent::BatchRead {
                first_row: batch.first_row,
                row_count: batch.len(),
            });

            let kept = self.filter_batch(batch, &plan.filter.bound, &sem, metrics);
            let rows = kept.len();
            metrics.on_rows_kept(rows);

            sink.write_rows(kept)?;
            self.emit(ExecutionEvent::BatchWritten {
                format: plan.sink.format,
                rows,
            });
        }

        sink.finish()
    }

    /// Evaluate `bound` over one batch in parallel chunks; survivors keep their input order.
    fn filter_batch(
        &self,
        batch: RowBatch,
        bound: &BoundPredicate,
        sem: &Semaphore,
        metrics: &ExecutionMetrics,
    ) -> Vec<Vec<Value>> {
        let RowBatch { first_row, mut rows } = batch;
        let ranges = chunk_ranges(rows.len(), self.opts.chunk_size);

        let masks: Vec<Vec<bool>> = self.pool.install(|| {
            ranges
                .into_par_iter()
                .map(|range| {
                    let permit = sem.acquire();
                    if permit.waited > Duration::ZERO {
                        metrics.on_throttle_wait(permit.waited);
                        self.emit(ExecutionEvent::ThrottleWaited {
                            duration: permit.waited,
                        });
                    }

                    metrics.on_chunk_start();
                    self.emit(ExecutionEvent::ChunkStarted {
                        start_row: first_row + range.start as u64,
                        row_count: range.len(),
                    });

                    let mask: Vec<bool> = rows[range].iter().map(|row| bound.matches(row)).collect();

                    self.emit(ExecutionEvent::ChunkFinished {
                        kept_rows: mask.iter().filter(|k| **k).count(),
                    });
                    metrics.on_chunk_end();
                    drop(permit);
                    mask
                })
                .collect()
        });

        let mut keep = masks.into_iter().flatten();
        rows.retain(|_| keep.next().unwrap_or(false));
        rows
    }

    fn report(&self, ctx: &ProcessingContext, result: &EngineResult<ProcessingStats>) {
        let Some(obs) = &self.outcome_observer else {
            return;
        };
        match result {
            Ok(stats) => obs.on_success(ctx, stats),
            Err(e) => {
                let sev = ProcessingSeverity::for_error(e);
                obs.on_failure(ctx, sev, e);
                if sev >= self.opts.alert_at_or_above {
                    obs.on_alert(ctx, sev, e);
                }
            }
        }
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

impl Default for CleaningEngine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl fmt::Debug for CleaningEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleaningEngine")
            .field("opts", &self.opts)
            .field("threads", &self.pool.current_num_threads())
            .field("observer_set", &self.observer.is_some())
            .field("outcome_observer_set", &self.outcome_observer.is_some())
            .field("stager_set", &self.stager.is_some())
            .finish()
    }
}

/// Removes the output file on drop unless the run completed.
struct PartialOutput {
    path: PathBuf,
    keep: bool,
}

impl PartialOutput {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            keep: false,
        }
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("removed partial output {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("could not remove partial output {}: {e}", self.path.display()),
        }
    }
}

fn chunk_ranges(row_count: usize, chunk_size: usize) -> Vec<Range<usize>> {
    let mut out = Vec::with_capacity(row_count.div_ceil(chunk_size));
    let mut start = 0usize;
    while start < row_count {
        let end = (start + chunk_size).min(row_count);
        out.push(start..end);
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    fn numbers_csv(dir: &Path, n: usize) -> PathBuf {
        let path = dir.join("numbers.csv");
        let mut body = String::from("id,parity\n");
        for i in 0..n {
            body.push_str(&format!("{i},{}\n", if i % 2 == 0 { "even" } else { "odd" }));
        }
        fs::write(&path, body).unwrap();
        path
    }

    fn opts(threads: usize, batch: usize, chunk: usize, in_flight: usize) -> EngineOptions {
        EngineOptions {
            num_threads: Some(threads),
            batch_size: batch,
            chunk_size: chunk,
            max_in_flight_chunks: in_flight,
            ..EngineOptions::default()
        }
    }

    #[test]
    fn chunk_ranges_cover_rows() {
        assert!(chunk_ranges(0, 4).is_empty());
        assert_eq!(chunk_ranges(10, 4), vec![0..4, 4..8, 8..10]);
        assert_eq!(chunk_ranges(3, 8), vec![0..3]);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let o: EngineOptions =
            serde_json::from_value(json!({"batch_size": 10, "compression": "gzip"})).unwrap();
        assert_eq!(o.batch_size, 10);
        assert_eq!(o.compression, ColumnarCompression::Gzip);
        assert_eq!(o.chunk_size, EngineOptions::default().chunk_size);
        assert_eq!(o.infer_schema_rows, 10_000);
        assert_eq!(o.alert_at_or_above, ProcessingSeverity::Critical);
    }

    #[test]
    fn filtered_rows_keep_input_order_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let input = numbers_csv(dir.path(), 200);
        let output = dir.path().join("even.csv");
        let engine = CleaningEngine::new(opts(4, 64, 3, 4));

        let rules = json!({"field": "parity", "operator": "equals", "value": "even"});
        let stats = engine
            .process(input.to_str().unwrap(), &output, &rules, OutputFormat::Csv)
            .unwrap();
        assert_eq!((stats.input_rows, stats.output_rows, stats.rows_filtered), (200, 100, 100));

        let mut rdr = csv::Reader::from_path(&output).unwrap();
        let ids: Vec<i64> = rdr
            .records()
            .map(|r| r.unwrap()[0].parse().unwrap())
            .collect();
        let expected: Vec<i64> = (0..200).filter(|i| i % 2 == 0).collect();
        assert_eq!(ids, expected);
    }

    struct ConcurrencyObserver {
        active_chunks: AtomicUsize,
        max_active_chunks: AtomicUsize,
        states: Mutex<Vec<RunState>>,
        batches: AtomicUsize,
    }

    impl ConcurrencyObserver {
        fn new() -> Self {
            Self {
                active_chunks: AtomicUsize::new(0),
                max_active_chunks: AtomicUsize::new(0),
                states: Mutex::new(Vec::new()),
                batches: AtomicUsize::new(0),
            }
        }
    }

    impl ExecutionObserver for ConcurrencyObserver {
        fn on_event(&self, event: &ExecutionEvent) {
            match event {
                ExecutionEvent::ChunkStarted { .. } => {
                    let now = self.active_chunks.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_active_chunks.fetch_max(now, Ordering::SeqCst);
                    // Long enough for chunks to overlap if not throttled.
                    std::thread::sleep(Duration::from_millis(1));
                }
                ExecutionEvent::ChunkFinished { .. } => {
                    let _ = self.active_chunks.fetch_sub(1, Ordering::SeqCst);
                }
                ExecutionEvent::BatchRead { .. } => {
                    let _ = self.batches.fetch_add(1, Ordering::SeqCst);
                }
                ExecutionEvent::StateChanged { to, .. } => self.states.lock().unwrap().push(*to),
                _ => {}
            }
        }
    }

    #[test]
    fn max_in_flight_chunks_throttles_chunk_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let input = numbers_csv(dir.path(), 100);
        let observer = Arc::new(ConcurrencyObserver::new());
        let obs_trait: Arc<dyn ExecutionObserver> = observer.clone();
        let engine = CleaningEngine::new(opts(4, 25, 1, 1)).with_observer(obs_trait);

        let rules = json!({"field": "id", "operator": "is_not_null"});
        let stats = engine
            .process(
                input.to_str().unwrap(),
                dir.path().join("all.parquet"),
                &rules,
                OutputFormat::Columnar,
            )
            .unwrap();

        assert_eq!(stats.output_rows, 100);
        assert_eq!(observer.max_active_chunks.load(Ordering::SeqCst), 1);
        assert_eq!(observer.batches.load(Ordering::SeqCst), 4);
        assert_eq!(
            *observer.states.lock().unwrap(),
            vec![RunState::Running, RunState::Succeeded]
        );
    }

    #[test]
    fn failed_run_reports_failed_state_and_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = numbers_csv(dir.path(), 10);
        let output = dir.path().join("out.csv");
        let observer = Arc::new(ConcurrencyObserver::new());
        let engine = CleaningEngine::new(opts(2, 4, 2, 2)).with_observer(observer.clone());

        let rules = json!({"field": "missing", "operator": "is_null"});
        let err = engine
            .process(input.to_str().unwrap(), &output, &rules, OutputFormat::Csv)
            .unwrap_err();
        assert!(err.rule_error().is_some());
        assert!(!output.exists());
        assert_eq!(
            *observer.states.lock().unwrap(),
            vec![RunState::Running, RunState::Failed]
        );
    }

    #[test]
    fn invalid_value_after_sample_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("late.csv");
        fs::write(&input, "n\n1\n2\n3\nfour\n").unwrap();
        let output = dir.path().join("out.csv");
        let engine = CleaningEngine::new(EngineOptions {
            infer_schema_rows: 2,
            batch_size: 1,
            ..opts(2, 1, 1, 1)
        });

        let rules = json!({"field": "n", "operator": "greater_than", "value": 0});
        let err = engine
            .process(input.to_str().unwrap(), &output, &rules, OutputFormat::Csv)
            .unwrap_err();
        assert!(matches!(err, crate::EngineError::InvalidValue { row: 4, .. }), "{err}");
        assert!(!output.exists());
    }

    #[test]
    #[should_panic(expected = "batch_size must be > 0")]
    fn zero_batch_size_panics() {
        let _ = CleaningEngine::new(EngineOptions {
            batch_size: 0,
            ..EngineOptions::default()
        });
    }
}
