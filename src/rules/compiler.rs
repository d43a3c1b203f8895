//! Rule tree → [`Predicate`] compilation.
//!
//! The compiler walks the tree, checks every combinator and operator against a closed
//! whitelist, and casts each literal into the inferred type of its column. It never evaluates
//! anything supplied by the caller and fails on the first problem it finds.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use crate::error::{RuleError, RuleResult};
use crate::types::{DATE_FORMAT, Schema, SchemaType, TypedScalar};

use super::node::{RuleNode, json_kind};
use super::predicate::{Combinator, ComparisonOp, Predicate};

/// Compile `rule` against `schema`.
///
/// Groups are folded left to right, so `and[a, b, c]` becomes `And(And(a, b), c)`.
/// Compilation is deterministic: equal inputs give structurally equal predicates.
pub fn compile(rule: &RuleNode, schema: &Schema) -> RuleResult<Predicate> {
    match rule {
        RuleNode::Group { combinator, rules } => compile_group(combinator, rules, schema),
        RuleNode::Comparison {
            field,
            operator,
            value,
        } => compile_comparison(field, operator, value.as_ref(), schema),
    }
}

/// Classify a JSON value as a [`RuleNode`] and compile it.
pub fn compile_json(rule: &JsonValue, schema: &Schema) -> RuleResult<Predicate> {
    compile(&RuleNode::from_json(rule)?, schema)
}

fn compile_group(combinator: &str, rules: &[RuleNode], schema: &Schema) -> RuleResult<Predicate> {
    let combinator: Combinator = combinator.parse()?;
    let (first, rest) = rules.split_first().ok_or(RuleError::EmptyGroup)?;

    let mut acc = compile(first, schema)?;
    for rule in rest {
        acc = combinator.join(acc, compile(rule, schema)?);
    }
    Ok(acc)
}

fn compile_comparison(
    field: &str,
    operator: &str,
    value: Option<&JsonValue>,
    schema: &Schema,
) -> RuleResult<Predicate> {
    if field.is_empty() {
        return Err(RuleError::MissingField);
    }
    let op: ComparisonOp = operator.parse()?;

    let value = if !op.takes_value() {
        None
    } else {
        let raw = value.ok_or_else(|| RuleError::MissingValue {
            field: field.to_string(),
            operator: op.to_string(),
        })?;
        let scalar = match schema.type_of(field) {
            Some(SchemaType::Unknown) | None => natural_scalar(field, raw)?,
            Some(target) => cast_literal(field, raw, target)?,
        };
        Some(scalar)
    };

    Ok(Predicate::Compare {
        column: field.to_string(),
        op,
        value,
    })
}

/// Cast a JSON literal into `target`.
///
/// Every (literal, type) pair either converts exactly or fails with
/// [`RuleError::TypeCastError`]; there is no silent fallback to the raw literal.
pub fn cast_literal(field: &str, raw: &JsonValue, target: SchemaType) -> RuleResult<TypedScalar> {
    let fail = |message: &str| RuleError::TypeCastError {
        field: field.to_string(),
        target: target.to_string(),
        raw: raw.to_string(),
        message: message.to_string(),
    };

    if matches!(raw, JsonValue::Array(_) | JsonValue::Object(_) | JsonValue::Null) {
        return Err(fail(&format!("expected a scalar, got {}", json_kind(raw))));
    }

    match target {
        SchemaType::Integer => match raw {
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(TypedScalar::Integer(i))
                } else {
                    match n.as_f64() {
                        // i64::MAX as f64 rounds up to 2^63, which is already out of range.
                        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                            Ok(TypedScalar::Integer(f as i64))
                        }
                        _ => Err(fail("number is not a 64-bit integer")),
                    }
                }
            }
            JsonValue::String(s) => s
                .trim()
                .parse::<i64>()
                .map(TypedScalar::Integer)
                .map_err(|e| fail(&e.to_string())),
            _ => Err(fail("expected an integer")),
        },
        SchemaType::Float => match raw {
            JsonValue::Number(n) => n
                .as_f64()
                .map(TypedScalar::Float)
                .ok_or_else(|| fail("number out of range")),
            JsonValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map(TypedScalar::Float)
                .map_err(|e| fail(&e.to_string())),
            _ => Err(fail("expected a number")),
        },
        SchemaType::Boolean => match raw {
            JsonValue::Bool(b) => Ok(TypedScalar::Boolean(*b)),
            JsonValue::String(s) => parse_rule_bool(s.trim())
                .map(TypedScalar::Boolean)
                .ok_or_else(|| fail("expected bool (true/false/1/0/yes/no)")),
            JsonValue::Number(n) => match n.as_i64() {
                Some(0) => Ok(TypedScalar::Boolean(false)),
                Some(1) => Ok(TypedScalar::Boolean(true)),
                _ => Err(fail("only 0 and 1 convert to bool")),
            },
            _ => Err(fail("expected a boolean")),
        },
        SchemaType::Text => match raw {
            JsonValue::String(s) => Ok(TypedScalar::Text(s.clone())),
            other => Ok(TypedScalar::Text(other.to_string())),
        },
        SchemaType::Date => match raw {
            JsonValue::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map(TypedScalar::Date)
                .map_err(|e| fail(&format!("expected YYYY-MM-DD: {e}"))),
            _ => Err(fail("expected a date string")),
        },
        SchemaType::Unknown => natural_scalar(field, raw),
    }
}

/// Keep a literal as its own JSON scalar type (column absent or untyped).
fn natural_scalar(field: &str, raw: &JsonValue) -> RuleResult<TypedScalar> {
    match raw {
        JsonValue::Bool(b) => Ok(TypedScalar::Boolean(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Ok(TypedScalar::Integer(i)),
            None => n
                .as_f64()
                .map(TypedScalar::Float)
                .ok_or_else(|| RuleError::TypeCastError {
                    field: field.to_string(),
                    target: SchemaType::Float.to_string(),
                    raw: raw.to_string(),
                    message: "number out of range".to_string(),
                }),
        },
        JsonValue::String(s) => Ok(TypedScalar::Text(s.clone())),
        other => Err(RuleError::TypeCastError {
            field: field.to_string(),
            target: SchemaType::Unknown.to_string(),
            raw: other.to_string(),
            message: format!("expected a scalar, got {}", json_kind(other)),
        }),
    }
}

fn parse_rule_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}
