//! Run-level outcome reporting.
//!
//! A [`ProcessingObserver`] attached to the engine hears about every finished `process` call:
//! `on_success` with the final stats, or `on_failure` with a computed
//! [`ProcessingSeverity`], followed by `on_alert` when that severity reaches the configured
//! threshold.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::EngineError;
use crate::execution::ProcessingStats;
use crate::output::OutputFormat;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingSeverity {
    Info,
    Warning,
    /// The run failed because of its input (rules or data).
    Error,
    /// The run failed because of infrastructure (unreadable source, unwritable sink).
    Critical,
}

impl ProcessingSeverity {
    /// Severity of a failed run.
    pub fn for_error(e: &EngineError) -> Self {
        match e {
            EngineError::SourceUnavailable { .. } | EngineError::SinkFailure { .. } => {
                Self::Critical
            }
            EngineError::InvalidValue { .. } | EngineError::ProcessingFailed(_) => Self::Error,
        }
    }
}

/// What a run was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingContext {
    /// Input location as supplied by the caller.
    pub input: String,
    pub output: PathBuf,
    pub format: OutputFormat,
}

/// Observer interface for run outcomes.
pub trait ProcessingObserver: Send + Sync {
    fn on_success(&self, _ctx: &ProcessingContext, _stats: &ProcessingStats) {}

    fn on_failure(&self, _ctx: &ProcessingContext, _severity: ProcessingSeverity, _error: &EngineError) {}

    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &ProcessingContext, severity: ProcessingSeverity, error: &EngineError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Fans callbacks out to several observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ProcessingObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn ProcessingObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl ProcessingObserver for CompositeObserver {
    fn on_success(&self, ctx: &ProcessingContext, stats: &ProcessingStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &ProcessingContext, severity: ProcessingSeverity, error: &EngineError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &ProcessingContext, severity: ProcessingSeverity, error: &EngineError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Logs outcomes to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl ProcessingObserver for StdErrObserver {
    fn on_success(&self, ctx: &ProcessingContext, stats: &ProcessingStats) {
        eprintln!(
            "[clean][ok] input={} output={} format={:?} rows={}->{} filtered={}",
            ctx.input,
            ctx.output.display(),
            ctx.format,
            stats.input_rows,
            stats.output_rows,
            stats.rows_filtered
        );
    }

    fn on_failure(&self, ctx: &ProcessingContext, severity: ProcessingSeverity, error: &EngineError) {
        eprintln!(
            "[clean][{:?}] input={} output={} err={}",
            severity,
            ctx.input,
            ctx.output.display(),
            error
        );
    }

    fn on_alert(&self, ctx: &ProcessingContext, severity: ProcessingSeverity, error: &EngineError) {
        eprintln!(
            "[ALERT][clean][{:?}] input={} output={} err={}",
            severity,
            ctx.input,
            ctx.output.display(),
            error
        );
    }
}

/// Appends one JSON object per run outcome to a local file (JSON Lines).
///
/// Logging is best-effort: a file that cannot be opened or written is skipped silently.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileObserver {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(&self, ctx: &ProcessingContext, outcome: &str, detail: serde_json::Value) {
        let mut entry = json!({
            "at": epoch_seconds(),
            "outcome": outcome,
            "input": ctx.input,
            "output": ctx.output,
            "format": ctx.format,
        });
        if let (Some(obj), serde_json::Value::Object(extra)) = (entry.as_object_mut(), detail) {
            obj.extend(extra);
        }

        let _held = self.write_lock.lock();
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{entry}"));
        if let Err(e) = appended {
            log::debug!("outcome log {} not written: {e}", self.path.display());
        }
    }
}

impl ProcessingObserver for FileObserver {
    fn on_success(&self, ctx: &ProcessingContext, stats: &ProcessingStats) {
        self.record(ctx, "succeeded", json!({ "stats": stats }));
    }

    fn on_failure(&self, ctx: &ProcessingContext, severity: ProcessingSeverity, error: &EngineError) {
        self.record(
            ctx,
            "failed",
            json!({ "severity": severity, "error": error.to_string() }),
        );
    }

    fn on_alert(&self, ctx: &ProcessingContext, severity: ProcessingSeverity, error: &EngineError) {
        self.record(
            ctx,
            "alert",
            json!({ "severity": severity, "error": error.to_string() }),
        );
    }
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
