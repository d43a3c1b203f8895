//! Input side of the pipeline.
//!
//! - [`infer`]: schema inference from a bounded sample
//! - [`csv`]: the lazy [`CsvScan`] source and its pull-based [`CsvBatchReader`]

pub mod csv;
pub mod infer;

pub use self::csv::{count_csv_records, parse_cell, CsvBatchReader, CsvScan, RowBatch};
pub use infer::{infer_schema_from_path, infer_schema_from_reader, DEFAULT_INFER_ROWS};
