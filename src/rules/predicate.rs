//! Compiled predicate form and row evaluation.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{RuleError, RuleResult};
use crate::types::{Schema, TypedScalar, Value};

/// Whitelisted comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
    IsNull,
    IsNotNull,
    StartsWith,
    EndsWith,
}

impl ComparisonOp {
    /// Every accepted operator.
    pub const ALL: [ComparisonOp; 12] = [
        Self::Equals,
        Self::NotEquals,
        Self::GreaterThan,
        Self::GreaterThanOrEqual,
        Self::LessThan,
        Self::LessThanOrEqual,
        Self::Contains,
        Self::NotContains,
        Self::IsNull,
        Self::IsNotNull,
        Self::StartsWith,
        Self::EndsWith,
    ];

    /// Wire name of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::GreaterThanOrEqual => "greater_than_or_equal",
            Self::LessThan => "less_than",
            Self::LessThanOrEqual => "less_than_or_equal",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::IsNull => "is_null",
            Self::IsNotNull => "is_not_null",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
        }
    }

    /// `false` for the null checks, which ignore any supplied value.
    pub fn takes_value(self) -> bool {
        !matches!(self, Self::IsNull | Self::IsNotNull)
    }

    /// Apply the operator to one cell.
    ///
    /// Null cells only ever satisfy `is_null`.
    pub fn evaluate(self, cell: &Value, literal: Option<&TypedScalar>) -> bool {
        match self {
            Self::IsNull => cell.is_null(),
            Self::IsNotNull => !cell.is_null(),
            Self::Equals => ordering(cell, literal) == Some(Ordering::Equal),
            Self::NotEquals => present(cell, literal)
                .is_some_and(|(c, l)| l.compare_cell(c) != Some(Ordering::Equal)),
            Self::GreaterThan => ordering(cell, literal) == Some(Ordering::Greater),
            Self::GreaterThanOrEqual => matches!(
                ordering(cell, literal),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::LessThan => ordering(cell, literal) == Some(Ordering::Less),
            Self::LessThanOrEqual => matches!(
                ordering(cell, literal),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Contains => text_pair(cell, literal).is_some_and(|(c, l)| c.contains(l.as_ref())),
            Self::NotContains => {
                text_pair(cell, literal).is_some_and(|(c, l)| !c.contains(l.as_ref()))
            }
            Self::StartsWith => {
                text_pair(cell, literal).is_some_and(|(c, l)| c.starts_with(l.as_ref()))
            }
            Self::EndsWith => text_pair(cell, literal).is_some_and(|(c, l)| c.ends_with(l.as_ref())),
        }
    }
}

fn present<'a>(
    cell: &'a Value,
    literal: Option<&'a TypedScalar>,
) -> Option<(&'a Value, &'a TypedScalar)> {
    match (cell, literal) {
        (Value::Null, _) | (_, None) => None,
        (c, Some(l)) => Some((c, l)),
    }
}

fn ordering(cell: &Value, literal: Option<&TypedScalar>) -> Option<Ordering> {
    present(cell, literal).and_then(|(c, l)| l.compare_cell(c))
}

fn text_pair<'a>(
    cell: &'a Value,
    literal: Option<&'a TypedScalar>,
) -> Option<(Cow<'a, str>, Cow<'a, str>)> {
    let (c, l) = present(cell, literal)?;
    let c = match c {
        Value::Text(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    };
    let l = match l {
        TypedScalar::Text(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    };
    Some((c, l))
}

impl FromStr for ComparisonOp {
    type Err = RuleError;

    /// Case-insensitive lookup in the whitelist.
    fn from_str(name: &str) -> RuleResult<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == lower)
            .ok_or_else(|| RuleError::UnknownOperator {
                operator: name.to_string(),
            })
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean connective of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
    And,
    Or,
}

impl FromStr for Combinator {
    type Err = RuleError;

    fn from_str(name: &str) -> RuleResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            _ => Err(RuleError::UnknownCombinator {
                combinator: name.to_string(),
            }),
        }
    }
}

impl Combinator {
    /// Join two predicates with this connective.
    pub fn join(self, left: Predicate, right: Predicate) -> Predicate {
        match self {
            Self::And => Predicate::And(Box::new(left), Box::new(right)),
            Self::Or => Predicate::Or(Box::new(left), Box::new(right)),
        }
    }
}

/// A compiled, immutable rule tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Compare {
        column: String,
        op: ComparisonOp,
        value: Option<TypedScalar>,
    },
}

impl Predicate {
    /// Column names referenced by the predicate, in first-use order, without duplicates.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::And(l, r) | Self::Or(l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
            Self::Compare { column, .. } => {
                if !out.contains(&column.as_str()) {
                    out.push(column);
                }
            }
        }
    }

    /// Resolve column names to positions in `schema`.
    pub fn bind(&self, schema: &Schema) -> RuleResult<BoundPredicate> {
        match self {
            Self::And(l, r) => Ok(BoundPredicate::And(
                Box::new(l.bind(schema)?),
                Box::new(r.bind(schema)?),
            )),
            Self::Or(l, r) => Ok(BoundPredicate::Or(
                Box::new(l.bind(schema)?),
                Box::new(r.bind(schema)?),
            )),
            Self::Compare { column, op, value } => {
                let index = schema
                    .index_of(column)
                    .ok_or_else(|| RuleError::UnknownColumn {
                        column: column.clone(),
                        available: schema.field_names().map(str::to_string).collect(),
                    })?;
                Ok(BoundPredicate::Compare {
                    index,
                    op: *op,
                    value: value.clone(),
                })
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(l, r) => write!(f, "({l} AND {r})"),
            Self::Or(l, r) => write!(f, "({l} OR {r})"),
            Self::Compare {
                column,
                op,
                value: Some(v),
            } => write!(f, "{column} {op} {v:?}"),
            Self::Compare {
                column,
                op,
                value: None,
            } => write!(f, "{column} {op}"),
        }
    }
}

/// A [`Predicate`] whose columns are resolved to row positions.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundPredicate {
    And(Box<BoundPredicate>, Box<BoundPredicate>),
    Or(Box<BoundPredicate>, Box<BoundPredicate>),
    Compare {
        index: usize,
        op: ComparisonOp,
        value: Option<TypedScalar>,
    },
}

impl BoundPredicate {
    /// Evaluate against one row in schema order. Missing trailing cells read as null.
    pub fn matches(&self, row: &[Value]) -> bool {
        match self {
            Self::And(l, r) => l.matches(row) && r.matches(row),
            Self::Or(l, r) => l.matches(row) || r.matches(row),
            Self::Compare { index, op, value } => {
                let cell = row.get(*index).unwrap_or(&Value::Null);
                op.evaluate(cell, value.as_ref())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, SchemaType};

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn operator_names_are_case_insensitive() {
        assert_eq!("EQUALS".parse::<ComparisonOp>().unwrap(), ComparisonOp::Equals);
        assert_eq!(
            "Greater_Than_Or_Equal".parse::<ComparisonOp>().unwrap(),
            ComparisonOp::GreaterThanOrEqual
        );
        for op in ComparisonOp::ALL {
            assert_eq!(op.as_str().parse::<ComparisonOp>().unwrap(), op);
        }
    }

    #[test]
    fn operators_outside_whitelist_are_rejected() {
        for name in ["regex", "matches", "eq", "==", "equals_ignore_case", "in", ""] {
            let err = name.parse::<ComparisonOp>().unwrap_err();
            assert!(matches!(err, RuleError::UnknownOperator { .. }), "{name}");
        }
    }

    #[test]
    fn combinators_are_closed() {
        assert_eq!("AND".parse::<Combinator>().unwrap(), Combinator::And);
        assert_eq!("or".parse::<Combinator>().unwrap(), Combinator::Or);
        for name in ["xor", "not", "&&", ""] {
            assert!(matches!(
                name.parse::<Combinator>(),
                Err(RuleError::UnknownCombinator { .. })
            ));
        }
    }

    #[test]
    fn null_cells_only_match_null_checks() {
        let lit = TypedScalar::Integer(1);
        for op in ComparisonOp::ALL {
            let expected = op == ComparisonOp::IsNull;
            assert_eq!(op.evaluate(&Value::Null, Some(&lit)), expected, "{op}");
        }
        assert!(ComparisonOp::IsNotNull.evaluate(&Value::Integer(0), None));
    }

    #[test]
    fn ordering_operators_on_integers() {
        let lit = TypedScalar::Integer(42);
        let cells = [Value::Integer(41), Value::Integer(42), Value::Integer(43)];
        let select = |op: ComparisonOp| {
            cells
                .iter()
                .map(|c| op.evaluate(c, Some(&lit)))
                .collect::<Vec<_>>()
        };
        assert_eq!(select(ComparisonOp::Equals), vec![false, true, false]);
        assert_eq!(select(ComparisonOp::NotEquals), vec![true, false, true]);
        assert_eq!(select(ComparisonOp::GreaterThan), vec![false, false, true]);
        assert_eq!(select(ComparisonOp::GreaterThanOrEqual), vec![false, true, true]);
        assert_eq!(select(ComparisonOp::LessThan), vec![true, false, false]);
        assert_eq!(select(ComparisonOp::LessThanOrEqual), vec![true, true, false]);
    }

    #[test]
    fn string_operators_are_literal_not_regex() {
        let lit = TypedScalar::Text("a.c".to_string());
        assert!(!ComparisonOp::Contains.evaluate(&text("abc"), Some(&lit)));
        assert!(ComparisonOp::Contains.evaluate(&text("xa.cx"), Some(&lit)));
        assert!(ComparisonOp::NotContains.evaluate(&text("abc"), Some(&lit)));
        assert!(ComparisonOp::StartsWith.evaluate(&text("a.cdef"), Some(&lit)));
        assert!(ComparisonOp::EndsWith.evaluate(&text("zza.c"), Some(&lit)));
    }

    #[test]
    fn string_operators_render_non_text_cells() {
        let lit = TypedScalar::Integer(4);
        assert!(ComparisonOp::StartsWith.evaluate(&Value::Integer(42), Some(&lit)));
        assert!(!ComparisonOp::EndsWith.evaluate(&Value::Integer(42), Some(&lit)));
    }

    #[test]
    fn bind_resolves_indexes_and_rejects_unknown_columns() {
        let schema = Schema::new(vec![
            Field::new("age", SchemaType::Integer),
            Field::new("name", SchemaType::Text),
        ]);
        let p = Combinator::Or.join(
            Predicate::Compare {
                column: "name".to_string(),
                op: ComparisonOp::Equals,
                value: Some(TypedScalar::Text("C".to_string())),
            },
            Predicate::Compare {
                column: "age".to_string(),
                op: ComparisonOp::IsNull,
                value: None,
            },
        );
        assert_eq!(p.columns(), vec!["name", "age"]);

        let bound = p.bind(&schema).unwrap();
        assert!(bound.matches(&[Value::Integer(1), text("C")]));
        assert!(bound.matches(&[Value::Null, text("A")]));
        assert!(!bound.matches(&[Value::Integer(1), text("A")]));

        let missing = Predicate::Compare {
            column: "height".to_string(),
            op: ComparisonOp::IsNull,
            value: None,
        };
        let err = missing.bind(&schema).unwrap_err();
        assert!(matches!(err, RuleError::UnknownColumn { ref column, .. } if column == "height"));
    }
}
