//! Schema inference from a bounded CSV sample.

use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;

use crate::error::{EngineError, EngineResult};
use crate::types::{DATE_FORMAT, Field, Schema, SchemaType};

/// Number of records sampled for inference when the caller does not say otherwise.
pub const DEFAULT_INFER_ROWS: usize = 10_000;

/// Infer a [`Schema`] from the header and at most `sample_rows` records of a CSV file.
///
/// Only a bounded prefix of the file is read. Failure to open the file or to read its header is
/// a [`EngineError::SourceUnavailable`]; ambiguous or unreadable sample rows never fail.
pub fn infer_schema_from_path(path: impl AsRef<Path>, sample_rows: usize) -> EngineResult<Schema> {
    let path = path.as_ref();
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| {
            EngineError::source_unavailable(format!("cannot open '{}'", path.display()), e)
        })?;
    infer_schema_from_reader(rdr, sample_rows)
}

/// Infer a [`Schema`] from an existing CSV reader (headers enabled).
pub fn infer_schema_from_reader<R: Read>(
    mut rdr: csv::Reader<R>,
    sample_rows: usize,
) -> EngineResult<Schema> {
    let headers = rdr
        .headers()
        .map_err(|e| EngineError::source_unavailable("cannot read csv header", e))?
        .clone();

    let mut candidates = vec![TypeCandidate::default(); headers.len()];
    let mut record = csv::StringRecord::new();
    let mut sampled = 0usize;
    while sampled < sample_rows {
        match rdr.read_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            // Best effort: a broken record is skipped for typing purposes.
            Err(_) => {
                sampled += 1;
                continue;
            }
        }
        for (idx, raw) in record.iter().enumerate().take(candidates.len()) {
            candidates[idx].update(raw);
        }
        sampled += 1;
    }

    let fields = headers
        .iter()
        .zip(candidates)
        .map(|(name, candidate)| Field::new(name, candidate.decide()))
        .collect();
    Ok(Schema::new(fields))
}

/// Tracks which types every non-empty value of a column has parsed as so far.
///
/// Values are trimmed only for the typed parses; a whitespace-only value is non-empty text.
#[derive(Debug, Clone)]
struct TypeCandidate {
    seen: bool,
    integer: bool,
    float: bool,
    boolean: bool,
    date: bool,
}

impl Default for TypeCandidate {
    fn default() -> Self {
        Self {
            seen: false,
            integer: true,
            float: true,
            boolean: true,
            date: true,
        }
    }
}

impl TypeCandidate {
    fn update(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        self.seen = true;
        let value = raw.trim();
        if self.integer && value.parse::<i64>().is_err() {
            self.integer = false;
        }
        if self.float && value.parse::<f64>().is_err() {
            self.float = false;
        }
        if self.boolean && parse_bool(value).is_none() {
            self.boolean = false;
        }
        if self.date && parse_date(value).is_none() {
            self.date = false;
        }
    }

    fn decide(self) -> SchemaType {
        if !self.seen {
            SchemaType::Unknown
        } else if self.integer {
            SchemaType::Integer
        } else if self.float {
            SchemaType::Float
        } else if self.boolean {
            SchemaType::Boolean
        } else if self.date {
            SchemaType::Date
        } else {
            SchemaType::Text
        }
    }
}

/// Boolean spelling accepted for CSV cells.
pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}
