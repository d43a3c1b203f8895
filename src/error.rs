use thiserror::Error;

/// Convenience result type for rule compilation.
pub type RuleResult<T> = Result<T, RuleError>;

/// Convenience result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error type returned by the rule compiler.
///
/// Every variant is a hard failure: the compiler never produces a best-guess predicate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    /// The node is neither a group nor a comparison.
    #[error("malformed rule: {message}")]
    MalformedRule { message: String },

    /// Group combinator is not `and`/`or`.
    #[error("unknown combinator '{combinator}' (allowed: and, or)")]
    UnknownCombinator { combinator: String },

    /// Comparison operator is outside the whitelist.
    #[error("unknown operator '{operator}'")]
    UnknownOperator { operator: String },

    /// A group with no child rules.
    #[error("group must contain at least one rule")]
    EmptyGroup,

    /// A comparison without a (non-empty) field name.
    #[error("rule must have a non-empty 'field'")]
    MissingField,

    /// A value-taking operator was given no value.
    #[error("operator '{operator}' on field '{field}' requires a 'value'")]
    MissingValue { field: String, operator: String },

    /// The literal could not be cast into the column's inferred type.
    #[error("cannot cast value {raw} for field '{field}' to {target}: {message}")]
    TypeCastError {
        field: String,
        target: String,
        raw: String,
        message: String,
    },

    /// The predicate references a column the input does not have.
    #[error("column '{column}' not found in input (columns={available:?})")]
    UnknownColumn {
        column: String,
        available: Vec<String>,
    },
}

/// An output format name that is neither `csv` nor `columnar`/`parquet`.
///
/// This is a request error: nothing has been opened or written when it is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported output format '{name}' (expected csv or columnar)")]
pub struct UnknownFormat {
    pub name: String,
}

/// Error type returned by [`crate::execution::CleaningEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The input cannot be opened or read (missing file, bad header, staging failure).
    #[error("source unavailable: {message}")]
    SourceUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The output cannot be written (disk, permissions, codec).
    #[error("sink failure: {message}")]
    SinkFailure {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A cell outside the inference sample does not parse as its column's type.
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    InvalidValue {
        row: u64,
        column: String,
        raw: String,
        message: String,
    },

    /// Rule compilation failed.
    #[error("processing failed: invalid rules: {0}")]
    ProcessingFailed(#[from] RuleError),
}

impl EngineError {
    pub(crate) fn source_unavailable(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn sink_failure(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SinkFailure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the compiler error when this is a rule failure.
    pub fn rule_error(&self) -> Option<&RuleError> {
        match self {
            Self::ProcessingFailed(e) => Some(e),
            _ => None,
        }
    }
}
