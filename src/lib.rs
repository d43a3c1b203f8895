//! `dataset-cleaning` filters CSV datasets with declarative rule trees.
//!
//! A rule tree is plain JSON: groups joined by `and`/`or` whose leaves compare a column against
//! a literal. The tree is compiled against a schema inferred from a sample of the input (never
//! evaluated as code), then applied by a streaming Scan → Filter → Sink pipeline that writes the
//! surviving rows as CSV or Parquet.
//!
//! The primary entrypoint is [`execution::CleaningEngine::process`].
//!
//! ## Rule grammar
//!
//! ```json
//! {"combinator": "and", "rules": [
//!     {"field": "age", "operator": "greater_than_or_equal", "value": 18},
//!     {"combinator": "or", "rules": [
//!         {"field": "country", "operator": "equals", "value": "DE"},
//!         {"field": "email", "operator": "ends_with", "value": ".de"}
//!     ]}
//! ]}
//! ```
//!
//! **Operators:** `equals`, `not_equals`, `greater_than`, `less_than`, `greater_than_or_equal`,
//! `less_than_or_equal`, `contains`, `not_contains`, `starts_with`, `ends_with`, `is_null`,
//! `is_not_null`. Anything else is rejected.
//!
//! **Types:** each column is inferred as integer, float, boolean, date (`YYYY-MM-DD`), text, or
//! unknown (no sampled values). Literals are cast to the column type at compile time; a literal
//! that cannot be cast fails compilation. Empty cells are null and only match `is_null`.
//!
//! ## Quick example
//!
//! ```no_run
//! use dataset_cleaning::{CleaningEngine, EngineOptions, OutputFormat};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), dataset_cleaning::EngineError> {
//! let engine = CleaningEngine::new(EngineOptions::default());
//! let rules = json!({"field": "age", "operator": "greater_than_or_equal", "value": 18});
//! let stats = engine.process(
//!     "/data/people.csv",
//!     "/data/out/adults.parquet",
//!     &rules,
//!     OutputFormat::Columnar,
//! )?;
//! assert_eq!(stats.rows_filtered, stats.input_rows - stats.output_rows);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`rules`]: rule tree wire format, compiler, and predicate evaluation
//! - [`ingestion`]: schema inference and the lazy CSV scan
//! - [`output`]: CSV and Parquet sinks
//! - [`execution`]: the engine, its plan, options, and execution events
//! - [`staging`]: fetching remote inputs into temporary local files
//! - [`observability`]: run outcome observers and alerting
//! - [`job`]: owned requests for job systems
//! - [`types`]: schema, cell, and literal types
//! - [`error`]: rule and engine error types

pub mod error;
pub mod execution;
pub mod ingestion;
pub mod job;
pub mod observability;
pub mod output;
pub mod rules;
pub mod staging;
pub mod types;

pub use error::{EngineError, EngineResult, RuleError, RuleResult, UnknownFormat};
pub use execution::{CleaningEngine, EngineOptions, ProcessingStats};
pub use output::OutputFormat;
pub use rules::RuleNode;
