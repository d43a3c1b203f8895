//! CSV sink.

use std::io::Write;

use crate::error::{EngineError, EngineResult};
use crate::types::{Schema, Value};

use super::BatchSink;

/// Writes a header and then rows sequentially. Nulls are written as empty cells.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    rows: u64,
}

impl<W: Write> CsvSink<W> {
    /// Wrap `inner` and write the header line for `schema`.
    pub fn new(inner: W, schema: &Schema) -> EngineResult<Self> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(inner);
        writer
            .write_record(schema.field_names())
            .map_err(|e| EngineError::sink_failure("cannot write csv header", e))?;
        Ok(Self { writer, rows: 0 })
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> EngineResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| EngineError::sink_failure("cannot flush csv output", e.into_error()))
    }
}

impl<W: Write> BatchSink for CsvSink<W> {
    fn write_rows(&mut self, rows: Vec<Vec<Value>>) -> EngineResult<()> {
        for row in &rows {
            self.writer
                .write_record(row.iter().map(|v| v.to_string()))
                .map_err(|e| EngineError::sink_failure("cannot write csv row", e))?;
            self.rows += 1;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> EngineResult<u64> {
        self.writer
            .flush()
            .map_err(|e| EngineError::sink_failure("cannot flush csv output", e))?;
        Ok(self.rows)
    }
}
