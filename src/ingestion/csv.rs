//! Lazy CSV scan and pull-based batch reading.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};
use crate::types::{Field, Schema, SchemaType, Value};

use super::infer::{infer_schema_from_path, parse_bool, parse_date};

/// A logical description of a CSV source: its location and inferred schema.
///
/// Opening a scan reads only the header and the inference sample. Rows are read later, batch by
/// batch, through [`CsvScan::batches`].
#[derive(Debug, Clone)]
pub struct CsvScan {
    path: PathBuf,
    schema: Schema,
}

impl CsvScan {
    /// Open a scan over `path`, inferring the schema from at most `infer_rows` records.
    pub fn open(path: impl AsRef<Path>, infer_rows: usize) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(EngineError::SourceUnavailable {
                message: format!("input file not found: {}", path.display()),
                source: None,
            });
        }
        let schema = infer_schema_from_path(&path, infer_rows)?;
        Ok(Self { path, schema })
    }

    /// Build a scan from an already-known schema (no inference pass).
    pub fn with_schema(path: impl AsRef<Path>, schema: Schema) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Start reading typed rows in batches of `batch_size`.
    pub fn batches(&self, batch_size: usize) -> EngineResult<CsvBatchReader<File>> {
        let rdr = open_reader(&self.path)?;
        Ok(CsvBatchReader::new(rdr, self.schema.clone(), batch_size))
    }

    /// Count data records with a streaming pass (header excluded).
    pub fn count_rows(&self) -> EngineResult<u64> {
        count_csv_records(&self.path)
    }
}

fn open_reader(path: &Path) -> EngineResult<csv::Reader<File>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| EngineError::source_unavailable(format!("cannot open '{}'", path.display()), e))
}

/// Count the data records of a CSV file without materializing them.
pub fn count_csv_records(path: impl AsRef<Path>) -> EngineResult<u64> {
    let path = path.as_ref();
    let mut rdr = open_reader(path)?;
    let mut record = csv::ByteRecord::new();
    let mut n = 0u64;
    while rdr
        .read_byte_record(&mut record)
        .map_err(|e| EngineError::source_unavailable(format!("cannot read '{}'", path.display()), e))?
    {
        n += 1;
    }
    Ok(n)
}

/// A contiguous run of typed rows read from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    /// 1-based data row number of the first row in the batch.
    pub first_row: u64,
    /// Row-major values, in schema order.
    pub rows: Vec<Vec<Value>>,
}

impl RowBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Pull-based reader yielding [`RowBatch`]es of at most `batch_size` rows.
///
/// Only one batch is held in memory at a time.
pub struct CsvBatchReader<R> {
    rdr: csv::Reader<R>,
    schema: Schema,
    col_idxs: Option<Vec<usize>>,
    batch_size: usize,
    record: csv::StringRecord,
    next_row: u64,
    done: bool,
}

impl<R: Read> CsvBatchReader<R> {
    /// Wrap a CSV reader (headers enabled) whose columns are described by `schema`.
    ///
    /// # Panics
    ///
    /// Panics if `batch_size == 0`.
    pub fn new(rdr: csv::Reader<R>, schema: Schema, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0");
        Self {
            rdr,
            schema,
            col_idxs: None,
            batch_size,
            record: csv::StringRecord::new(),
            next_row: 1,
            done: false,
        }
    }

    /// Map schema fields -> CSV column indexes.
    ///
    /// A header identical to the schema maps by position, so repeated column names stay distinct.
    /// Otherwise columns are matched by name (allows re-ordered CSV columns), and a name that
    /// appears more than once in the header is rejected as ambiguous.
    fn resolve_columns(&mut self) -> EngineResult<Vec<usize>> {
        let headers = self
            .rdr
            .headers()
            .map_err(|e| EngineError::source_unavailable("cannot read csv header", e))?;
        let fields = &self.schema.fields;
        if headers.len() == fields.len() && headers.iter().zip(fields).all(|(h, f)| h == f.name) {
            return Ok((0..fields.len()).collect());
        }

        let header_error = |message: String| EngineError::SourceUnavailable {
            message: format!("{message}. headers={:?}", headers.iter().collect::<Vec<_>>()),
            source: None,
        };
        let mut idxs = Vec::with_capacity(fields.len());
        for field in fields {
            let mut found = headers
                .iter()
                .enumerate()
                .filter(|(_, h)| *h == field.name)
                .map(|(idx, _)| idx);
            match (found.next(), found.next()) {
                (Some(idx), None) => idxs.push(idx),
                (Some(_), Some(_)) => {
                    return Err(header_error(format!("ambiguous column '{}'", field.name)));
                }
                (None, _) => return Err(header_error(format!("missing column '{}'", field.name))),
            }
        }
        Ok(idxs)
    }

    fn read_batch(&mut self) -> EngineResult<Option<RowBatch>> {
        if self.col_idxs.is_none() {
            self.col_idxs = Some(self.resolve_columns()?);
        }
        let first_row = self.next_row;
        let mut rows = Vec::with_capacity(self.batch_size);
        while rows.len() < self.batch_size {
            let more = self
                .rdr
                .read_record(&mut self.record)
                .map_err(|e| {
                    EngineError::source_unavailable(format!("cannot read row {}", self.next_row), e)
                })?;
            if !more {
                self.done = true;
                break;
            }
            let idxs = self.col_idxs.as_deref().unwrap_or_default();
            let mut row = Vec::with_capacity(idxs.len());
            for (field, &csv_idx) in self.schema.fields.iter().zip(idxs) {
                let raw = self.record.get(csv_idx).unwrap_or("");
                row.push(parse_cell(self.next_row, field, raw)?);
            }
            rows.push(row);
            self.next_row += 1;
        }

        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(RowBatch { first_row, rows }))
        }
    }
}

impl<R: Read> Iterator for CsvBatchReader<R> {
    type Item = EngineResult<RowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Parse one raw CSV cell into the field's type.
///
/// An empty cell is [`Value::Null`]. Text cells are kept verbatim, surrounding whitespace
/// included; typed cells are trimmed before parsing, and a typed cell holding only whitespace
/// is null.
pub fn parse_cell(row: u64, field: &Field, raw: &str) -> EngineResult<Value> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    let trimmed = raw.trim();
    let invalid = |message: String| EngineError::InvalidValue {
        row,
        column: field.name.clone(),
        raw: raw.to_owned(),
        message,
    };

    match field.data_type {
        SchemaType::Text | SchemaType::Unknown => Ok(Value::Text(raw.to_owned())),
        _ if trimmed.is_empty() => Ok(Value::Null),
        SchemaType::Integer => trimmed
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|e| invalid(e.to_string())),
        SchemaType::Float => trimmed
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| invalid(e.to_string())),
        SchemaType::Boolean => parse_bool(trimmed)
            .map(Value::Boolean)
            .ok_or_else(|| invalid("expected bool (true/false)".to_string())),
        SchemaType::Date => parse_date(trimmed)
            .map(Value::Date)
            .ok_or_else(|| invalid("expected date (YYYY-MM-DD)".to_string())),
    }
}
