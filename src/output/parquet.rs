//! Parquet sink.
//!
//! Every column is written as an `OPTIONAL` leaf so nulls survive the round trip:
//!
//! | schema type        | physical     | logical  |
//! |--------------------|--------------|----------|
//! | Integer            | `INT64`      |          |
//! | Float              | `DOUBLE`     |          |
//! | Boolean            | `BOOLEAN`    |          |
//! | Date               | `INT32`      | `DATE`   |
//! | Text / Unknown     | `BYTE_ARRAY` | `STRING` |

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::Datelike;
use parquet::basic::{Compression, GzipLevel, LogicalType, Repetition, Type as PhysicalType, ZstdLevel};
use parquet::column::writer::ColumnWriter;
use parquet::data_type::ByteArray;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::types::{Type, TypePtr};

use crate::error::{EngineError, EngineResult};
use crate::types::{Field, Schema, SchemaType, Value};

use super::{BatchSink, ColumnarCompression};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

impl From<ColumnarCompression> for Compression {
    fn from(c: ColumnarCompression) -> Self {
        match c {
            ColumnarCompression::Uncompressed => Compression::UNCOMPRESSED,
            ColumnarCompression::Snappy => Compression::SNAPPY,
            ColumnarCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ColumnarCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ColumnarCompression::Lz4 => Compression::LZ4_RAW,
        }
    }
}

/// Buffers incoming rows and writes them out in row groups of `row_group_rows`.
///
/// At most one row group plus one incoming batch is held in memory; the last, shorter row group
/// is written by [`BatchSink::finish`].
pub struct ParquetSink<W: Write + Send> {
    writer: SerializedFileWriter<W>,
    schema: Schema,
    row_group_rows: usize,
    pending: Vec<Vec<Value>>,
    rows: u64,
}

impl<W: Write + Send> ParquetSink<W> {
    /// # Panics
    ///
    /// Panics if `row_group_rows == 0`.
    pub fn new(
        inner: W,
        schema: &Schema,
        compression: ColumnarCompression,
        row_group_rows: usize,
    ) -> EngineResult<Self> {
        assert!(row_group_rows > 0, "row_group_rows must be > 0");
        let parquet_schema = parquet_schema(schema).map_err(sink_err("cannot build parquet schema"))?;
        let props = WriterProperties::builder()
            .set_compression(compression.into())
            .build();
        let writer = SerializedFileWriter::new(inner, parquet_schema, Arc::new(props))
            .map_err(sink_err("cannot open parquet writer"))?;
        Ok(Self {
            writer,
            schema: schema.clone(),
            row_group_rows,
            pending: Vec::new(),
            rows: 0,
        })
    }

    fn write_row_group(&mut self, rows: &[Vec<Value>]) -> Result<(), ParquetError> {
        let mut rg = self.writer.next_row_group()?;
        for (idx, field) in self.schema.fields.iter().enumerate() {
            let mut col = rg.next_column()?.ok_or_else(|| {
                ParquetError::General(format!("no column writer for '{}'", field.name))
            })?;
            write_column(col.untyped(), field, idx, rows)?;
            col.close()?;
        }
        rg.close()?;
        Ok(())
    }
}

impl<W: Write + Send> BatchSink for ParquetSink<W> {
    fn write_rows(&mut self, rows: Vec<Vec<Value>>) -> EngineResult<()> {
        self.rows += rows.len() as u64;
        self.pending.extend(rows);
        while self.pending.len() >= self.row_group_rows {
            let rest = self.pending.split_off(self.row_group_rows);
            let full = std::mem::replace(&mut self.pending, rest);
            self.write_row_group(&full)
                .map_err(sink_err("cannot write parquet row group"))?;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> EngineResult<u64> {
        let mut this = *self;
        if !this.pending.is_empty() {
            let tail = std::mem::take(&mut this.pending);
            this.write_row_group(&tail)
                .map_err(sink_err("cannot write parquet row group"))?;
        }
        this.writer
            .close()
            .map_err(sink_err("cannot finalize parquet file"))?;
        Ok(this.rows)
    }
}

/// Total row count from the file footer; row data is not read.
pub fn count_parquet_rows(path: impl AsRef<Path>) -> EngineResult<u64> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        EngineError::source_unavailable(format!("cannot open '{}'", path.display()), e)
    })?;
    let reader = SerializedFileReader::new(file).map_err(|e| {
        EngineError::source_unavailable(format!("cannot read parquet '{}'", path.display()), e)
    })?;
    footer_row_count(path, reader.metadata().file_metadata().num_rows())
}

fn footer_row_count(path: &Path, rows: i64) -> EngineResult<u64> {
    u64::try_from(rows).map_err(|e| {
        EngineError::source_unavailable(
            format!("parquet '{}' reports a negative row count ({rows})", path.display()),
            e,
        )
    })
}

fn sink_err(message: &'static str) -> impl Fn(ParquetError) -> EngineError {
    move |e| EngineError::sink_failure(message, e)
}

/// Column names must be unique within a Parquet group.
fn parquet_schema(schema: &Schema) -> Result<TypePtr, ParquetError> {
    let mut names = HashSet::with_capacity(schema.len());
    if let Some(dup) = schema.fields.iter().find(|f| !names.insert(f.name.as_str())) {
        return Err(ParquetError::General(format!(
            "column '{}' appears more than once",
            dup.name
        )));
    }

    let fields = schema
        .fields
        .iter()
        .map(|f| {
            let (physical, logical) = match f.data_type {
                SchemaType::Integer => (PhysicalType::INT64, None),
                SchemaType::Float => (PhysicalType::DOUBLE, None),
                SchemaType::Boolean => (PhysicalType::BOOLEAN, None),
                SchemaType::Date => (PhysicalType::INT32, Some(LogicalType::Date)),
                SchemaType::Text | SchemaType::Unknown => {
                    (PhysicalType::BYTE_ARRAY, Some(LogicalType::String))
                }
            };
            Type::primitive_type_builder(&f.name, physical)
                .with_repetition(Repetition::OPTIONAL)
                .with_logical_type(logical)
                .build()
                .map(Arc::new)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Arc::new(
        Type::group_type_builder("schema")
            .with_fields(fields)
            .build()?,
    ))
}

/// Split one column of `rows` into its non-null values and definition levels.
fn split_column<T>(
    rows: &[Vec<Value>],
    idx: usize,
    extract: impl Fn(&Value) -> Option<T>,
) -> (Vec<T>, Vec<i16>) {
    let mut values = Vec::with_capacity(rows.len());
    let mut def_levels = Vec::with_capacity(rows.len());
    for row in rows {
        match row.get(idx).and_then(&extract) {
            Some(v) => {
                values.push(v);
                def_levels.push(1);
            }
            None => def_levels.push(0),
        }
    }
    (values, def_levels)
}

fn write_column(
    writer: &mut ColumnWriter<'_>,
    field: &Field,
    idx: usize,
    rows: &[Vec<Value>],
) -> Result<(), ParquetError> {
    match (writer, field.data_type) {
        (ColumnWriter::Int64ColumnWriter(w), SchemaType::Integer) => {
            let (values, defs) = split_column(rows, idx, |v| match v {
                Value::Integer(i) => Some(*i),
                _ => None,
            });
            w.write_batch(&values, Some(defs.as_slice()), None)?;
        }
        (ColumnWriter::DoubleColumnWriter(w), SchemaType::Float) => {
            let (values, defs) = split_column(rows, idx, |v| match v {
                Value::Float(f) => Some(*f),
                _ => None,
            });
            w.write_batch(&values, Some(defs.as_slice()), None)?;
        }
        (ColumnWriter::BoolColumnWriter(w), SchemaType::Boolean) => {
            let (values, defs) = split_column(rows, idx, |v| match v {
                Value::Boolean(b) => Some(*b),
                _ => None,
            });
            w.write_batch(&values, Some(defs.as_slice()), None)?;
        }
        (ColumnWriter::Int32ColumnWriter(w), SchemaType::Date) => {
            let (values, defs) = split_column(rows, idx, |v| match v {
                Value::Date(d) => Some(d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
                _ => None,
            });
            w.write_batch(&values, Some(defs.as_slice()), None)?;
        }
        (ColumnWriter::ByteArrayColumnWriter(w), SchemaType::Text | SchemaType::Unknown) => {
            let (values, defs) = split_column(rows, idx, |v| match v {
                Value::Text(s) => Some(ByteArray::from(s.as_str())),
                _ => None,
            });
            w.write_batch(&values, Some(defs.as_slice()), None)?;
        }
        (_, data_type) => {
            return Err(ParquetError::General(format!(
                "column '{}' of type {data_type} has an unexpected parquet writer",
                field.name
            )));
        }
    }
    Ok(())
}
