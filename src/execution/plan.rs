//! Logical plan: Scan → Filter → Sink.
//!
//! Building a plan reads no rows; it only ties the lazy scan, the bound predicate and the sink
//! description together so each stage can be inspected before execution.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::RuleResult;
use crate::ingestion::CsvScan;
use crate::output::{ColumnarCompression, OutputFormat};
use crate::rules::{BoundPredicate, Predicate};

/// Filter stage: the compiled predicate and its column-bound form.
#[derive(Debug, Clone)]
pub struct FilterStage {
    pub predicate: Predicate,
    pub bound: BoundPredicate,
}

/// Where and how filtered rows are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSpec {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub compression: ColumnarCompression,
    /// Target rows per Parquet row group.
    pub row_group_rows: usize,
}

#[derive(Debug, Clone)]
pub struct LogicalPlan {
    pub scan: CsvScan,
    pub filter: FilterStage,
    pub sink: SinkSpec,
}

impl LogicalPlan {
    /// Bind `predicate` to the scan's schema and assemble the plan.
    pub fn new(scan: CsvScan, predicate: Predicate, sink: SinkSpec) -> RuleResult<Self> {
        let bound = predicate.bind(scan.schema())?;
        Ok(Self {
            scan,
            filter: FilterStage { predicate, bound },
            sink,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.sink.path
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<String> = self
            .scan
            .schema()
            .fields
            .iter()
            .map(|c| format!("{}:{}", c.name, c.data_type))
            .collect();
        write!(
            f,
            "scan[{} ({})] -> filter[{}] -> sink[{:?} {}",
            self.scan.path().display(),
            columns.join(", "),
            self.filter.predicate,
            self.sink.format,
            self.sink.path.display(),
        )?;
        if self.sink.format == OutputFormat::Columnar {
            write!(f, " {:?}", self.sink.compression)?;
        }
        f.write_str("]")
    }
}
