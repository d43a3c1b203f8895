//! Core data model types.
//!
//! A [`Schema`] is inferred per input file and describes every column with a [`SchemaType`].
//! Rows flowing through the pipeline are slices of typed [`Value`]s in schema order, and rule
//! literals are carried as [`TypedScalar`]s after casting.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date format used for inference, casting and output rendering.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit floating point number.
    Float,
    /// Boolean.
    Boolean,
    /// UTF-8 string.
    Text,
    /// Calendar date (`YYYY-MM-DD`).
    Date,
    /// No non-empty value was seen in the inference sample.
    Unknown,
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Date => "date",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A single named, typed column in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name (CSV header).
    pub name: String,
    /// Inferred type.
    pub data_type: SchemaType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: SchemaType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered column name → type mapping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns the type of a field by name, if present.
    pub fn type_of(&self, name: &str) -> Option<SchemaType> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.data_type)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` when the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// Boolean.
    Boolean(bool),
    /// UTF-8 string.
    Text(String),
    /// Calendar date.
    Date(NaiveDate),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    /// Renders the value the way it is written to CSV output (`Null` is empty).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(v) => write!(f, "{v}"),
            // Debug keeps the trailing `.0` on integral floats.
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
        }
    }
}

/// A rule literal after casting into its column type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedScalar {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Date(NaiveDate),
}

impl fmt::Display for TypedScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
        }
    }
}

impl TypedScalar {
    /// Compares a non-null cell against this literal.
    ///
    /// Integer/float pairs are compared numerically. A text cell is compared against the
    /// literal's textual rendering. Any other mixed pair is unordered (`None`).
    pub fn compare_cell(&self, cell: &Value) -> Option<Ordering> {
        match (cell, self) {
            (Value::Integer(a), TypedScalar::Integer(b)) => Some(a.cmp(b)),
            (Value::Integer(a), TypedScalar::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), TypedScalar::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), TypedScalar::Float(b)) => a.partial_cmp(b),
            (Value::Boolean(a), TypedScalar::Boolean(b)) => Some(a.cmp(b)),
            (Value::Date(a), TypedScalar::Date(b)) => Some(a.cmp(b)),
            (Value::Text(a), TypedScalar::Text(b)) => Some(a.as_str().cmp(b.as_str())),
            (Value::Text(a), other) => Some(a.as_str().cmp(other.to_string().as_str())),
            _ => None,
        }
    }
}
