//! Streaming sinks for filtered rows.
//!
//! Both sinks consume rows one batch at a time and never hold more than the current batch:
//!
//! - [`csv::CsvSink`]: header plus one line per row, written sequentially
//! - [`parquet::ParquetSink`]: survivors buffered into row groups of a fixed target size, with a
//!   selectable codec

pub mod csv;
pub mod parquet;

use std::fs::{self, File};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult, UnknownFormat};
use crate::types::{Schema, Value};

pub use self::csv::CsvSink;
pub use self::parquet::{count_parquet_rows, ParquetSink};

/// Requested output artifact format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Row-oriented comma-separated text.
    Csv,
    /// Columnar compressed format (Apache Parquet).
    #[default]
    #[serde(alias = "parquet")]
    Columnar,
}

impl OutputFormat {
    /// File extension used for artifacts of this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Columnar => "parquet",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    /// Parse a format name (case-insensitive). `parquet` is accepted for columnar output.
    fn from_str(s: &str) -> Result<Self, UnknownFormat> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "columnar" | "parquet" => Ok(Self::Columnar),
            _ => Err(UnknownFormat { name: s.to_string() }),
        }
    }
}

/// Compression codec for columnar output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnarCompression {
    Uncompressed,
    /// Fast general-purpose codec.
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

/// A writer that accepts filtered rows batch by batch.
pub trait BatchSink {
    /// Append rows (in schema order). An empty batch is a no-op.
    fn write_rows(&mut self, rows: Vec<Vec<Value>>) -> EngineResult<()>;

    /// Flush and close the artifact, returning the number of rows written.
    fn finish(self: Box<Self>) -> EngineResult<u64>;
}

/// Create `path` (and its parent directories) and open a sink of the requested format.
///
/// `row_group_rows` is the row group size of columnar output; CSV output ignores it.
pub fn open_sink(
    format: OutputFormat,
    path: &Path,
    schema: &Schema,
    compression: ColumnarCompression,
    row_group_rows: usize,
) -> EngineResult<Box<dyn BatchSink>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            EngineError::sink_failure(format!("cannot create directory '{}'", parent.display()), e)
        })?;
    }
    let file = File::create(path)
        .map_err(|e| EngineError::sink_failure(format!("cannot create '{}'", path.display()), e))?;

    Ok(match format {
        OutputFormat::Csv => Box::new(CsvSink::new(file, schema)?),
        OutputFormat::Columnar => Box::new(ParquetSink::new(
            file,
            schema,
            compression,
            row_group_rows,
        )?),
    })
}

/// Count the rows of a written artifact with a streaming pass.
pub fn count_output_rows(path: &Path, format: OutputFormat) -> EngineResult<u64> {
    match format {
        OutputFormat::Csv => crate::ingestion::count_csv_records(path),
        OutputFormat::Columnar => count_parquet_rows(path),
    }
}
