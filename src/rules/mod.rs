//! Rule compiler.
//!
//! A JSON rule tree ([`RuleNode`]) is compiled against an inferred [`crate::types::Schema`]
//! into a [`Predicate`]: a closed expression tree of whitelisted comparisons joined by
//! `AND`/`OR`. Before execution the predicate is bound to column positions
//! ([`BoundPredicate`]) and evaluated row by row.
//!
//! ```rust
//! use dataset_cleaning::rules::{compile_json, ComparisonOp, Predicate};
//! use dataset_cleaning::types::{Field, Schema, SchemaType, TypedScalar, Value};
//! use serde_json::json;
//!
//! let schema = Schema::new(vec![
//!     Field::new("age", SchemaType::Integer),
//!     Field::new("name", SchemaType::Text),
//! ]);
//! let rule = json!({"field": "age", "operator": "greater_than_or_equal", "value": "18"});
//!
//! let predicate = compile_json(&rule, &schema).unwrap();
//! assert_eq!(
//!     predicate,
//!     Predicate::Compare {
//!         column: "age".to_string(),
//!         op: ComparisonOp::GreaterThanOrEqual,
//!         value: Some(TypedScalar::Integer(18)),
//!     }
//! );
//!
//! let bound = predicate.bind(&schema).unwrap();
//! assert!(bound.matches(&[Value::Integer(42), Value::Text("B".to_string())]));
//! assert!(!bound.matches(&[Value::Integer(17), Value::Text("A".to_string())]));
//! ```

pub mod compiler;
pub mod node;
pub mod predicate;

pub use compiler::{cast_literal, compile, compile_json};
pub use node::RuleNode;
pub use predicate::{BoundPredicate, Combinator, ComparisonOp, Predicate};
