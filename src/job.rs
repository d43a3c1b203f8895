//! Owned processing requests, for callers that enqueue cleaning work in a job system.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::EngineResult;
use crate::execution::{CleaningEngine, ProcessingStats};
use crate::output::OutputFormat;

/// Lifecycle of a queued cleaning job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A self-contained description of one cleaning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRequest {
    /// Local path or object-store key of the CSV input.
    pub input: String,
    pub output: PathBuf,
    /// The JSON rule tree.
    pub rules: JsonValue,
    #[serde(default)]
    pub format: OutputFormat,
}

impl ProcessingRequest {
    /// Request writing to `job_<id>.<ext>` under `output_dir`.
    pub fn for_job(
        job_id: &str,
        input: impl Into<String>,
        output_dir: impl AsRef<Path>,
        rules: JsonValue,
        format: OutputFormat,
    ) -> Self {
        Self {
            input: input.into(),
            output: job_output_path(output_dir, job_id, format),
            rules,
            format,
        }
    }

    /// Execute the request on `engine`.
    pub fn run(&self, engine: &CleaningEngine) -> EngineResult<ProcessingStats> {
        engine.process(&self.input, &self.output, &self.rules, self.format)
    }

    /// Execute the request, reporting `Running` and then `Completed` or `Failed` to `on_status`.
    ///
    /// The caller owns the `Pending` state; it is never reported here.
    pub fn run_with_status(
        &self,
        engine: &CleaningEngine,
        mut on_status: impl FnMut(JobStatus),
    ) -> EngineResult<ProcessingStats> {
        on_status(JobStatus::Running);
        let result = self.run(engine);
        on_status(if result.is_ok() {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        });
        result
    }
}

/// Output location for a job: `<dir>/job_<id>.<ext>`.
pub fn job_output_path(dir: impl AsRef<Path>, job_id: &str, format: OutputFormat) -> PathBuf {
    dir.as_ref()
        .join(format!("job_{job_id}.{}", format.extension()))
}
