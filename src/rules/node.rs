//! Wire format of a rule tree.
//!
//! ```text
//! RuleNode   := Group | Comparison
//! Group      := { "combinator": "and" | "or", "rules": [RuleNode, ...] }
//! Comparison := { "field": string, "operator": string, "value"?: scalar }
//! ```
//!
//! Parsing only classifies shapes. Whitelists, emptiness and casting are enforced by
//! [`super::compile`], so a [`RuleNode`] may still hold an unknown operator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{RuleError, RuleResult};

/// One node of a JSON rule tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JsonValue", into = "JsonValue")]
pub enum RuleNode {
    /// Boolean connective over child rules.
    Group {
        combinator: String,
        rules: Vec<RuleNode>,
    },
    /// Single-column test. `value` is `None` when absent or JSON `null`.
    Comparison {
        field: String,
        operator: String,
        value: Option<JsonValue>,
    },
}

impl RuleNode {
    /// Convenience constructor for a group.
    pub fn group(combinator: impl Into<String>, rules: Vec<RuleNode>) -> Self {
        Self::Group {
            combinator: combinator.into(),
            rules,
        }
    }

    /// Convenience constructor for a comparison.
    pub fn comparison(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: Option<JsonValue>,
    ) -> Self {
        Self::Comparison {
            field: field.into(),
            operator: operator.into(),
            value,
        }
    }

    /// Classify a JSON value as a rule tree.
    ///
    /// A node is a group when it has `combinator` and neither `field` nor `operator`, and a
    /// comparison when it has both `field` and `operator` and no `combinator`. Every other
    /// shape is [`RuleError::MalformedRule`].
    pub fn from_json(json: &JsonValue) -> RuleResult<Self> {
        let obj = json.as_object().ok_or_else(|| RuleError::MalformedRule {
            message: format!("rule must be a json object, got {}", json_kind(json)),
        })?;

        let has_combinator = obj.contains_key("combinator");
        let has_field = obj.contains_key("field");
        let has_operator = obj.contains_key("operator");

        match (has_combinator, has_field, has_operator) {
            (true, false, false) => Self::group_from_json(obj),
            (false, true, true) => Ok(Self::comparison_from_json(obj)),
            (true, _, _) => Err(RuleError::MalformedRule {
                message: "rule cannot be both a group and a comparison".to_string(),
            }),
            _ => Err(RuleError::MalformedRule {
                message: "rule must have 'combinator' or both 'field' and 'operator'".to_string(),
            }),
        }
    }

    /// Parse a JSON document into a rule tree.
    pub fn from_json_str(input: &str) -> RuleResult<Self> {
        let json: JsonValue = serde_json::from_str(input).map_err(|e| RuleError::MalformedRule {
            message: format!("invalid json: {e}"),
        })?;
        Self::from_json(&json)
    }

    fn group_from_json(obj: &Map<String, JsonValue>) -> RuleResult<Self> {
        let combinator = string_or_rendered(&obj["combinator"]);
        let rules = match obj.get("rules") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(Self::from_json)
                .collect::<RuleResult<Vec<_>>>()?,
            Some(other) => {
                return Err(RuleError::MalformedRule {
                    message: format!("'rules' must be an array, got {}", json_kind(other)),
                });
            }
        };
        Ok(Self::Group { combinator, rules })
    }

    fn comparison_from_json(obj: &Map<String, JsonValue>) -> Self {
        // A non-string field is treated as missing; the compiler reports it.
        let field = obj["field"].as_str().unwrap_or_default().to_string();
        let operator = string_or_rendered(&obj["operator"]);
        let value = obj.get("value").filter(|v| !v.is_null()).cloned();
        Self::Comparison {
            field,
            operator,
            value,
        }
    }

    /// Render the node back to its JSON wire form.
    pub fn to_json(&self) -> JsonValue {
        let mut obj = Map::new();
        match self {
            Self::Group { combinator, rules } => {
                obj.insert("combinator".into(), JsonValue::String(combinator.clone()));
                obj.insert(
                    "rules".into(),
                    JsonValue::Array(rules.iter().map(Self::to_json).collect()),
                );
            }
            Self::Comparison {
                field,
                operator,
                value,
            } => {
                obj.insert("field".into(), JsonValue::String(field.clone()));
                obj.insert("operator".into(), JsonValue::String(operator.clone()));
                if let Some(v) = value {
                    obj.insert("value".into(), v.clone());
                }
            }
        }
        JsonValue::Object(obj)
    }
}

impl TryFrom<JsonValue> for RuleNode {
    type Error = RuleError;

    fn try_from(json: JsonValue) -> RuleResult<Self> {
        Self::from_json(&json)
    }
}

impl TryFrom<&JsonValue> for RuleNode {
    type Error = RuleError;

    fn try_from(json: &JsonValue) -> RuleResult<Self> {
        Self::from_json(json)
    }
}

impl From<RuleNode> for JsonValue {
    fn from(node: RuleNode) -> Self {
        node.to_json()
    }
}

fn string_or_rendered(v: &JsonValue) -> String {
    match v {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn json_kind(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_nested_groups_and_comparisons() {
        let node = RuleNode::from_json(&json!({
            "combinator": "OR",
            "rules": [
                {"field": "age", "operator": "less_than", "value": 18},
                {"field": "name", "operator": "is_null"}
            ]
        }))
        .unwrap();

        assert_eq!(
            node,
            RuleNode::group(
                "OR",
                vec![
                    RuleNode::comparison("age", "less_than", Some(json!(18))),
                    RuleNode::comparison("name", "is_null", None),
                ]
            )
        );
    }

    #[test]
    fn rejects_shapeless_and_ambiguous_nodes() {
        for bad in [
            json!([]),
            json!("age > 18"),
            json!({"field": "age"}),
            json!({"operator": "equals", "value": 1}),
            json!({"combinator": "and", "field": "age", "operator": "equals"}),
        ] {
            let err = RuleNode::from_json(&bad).unwrap_err();
            assert!(matches!(err, RuleError::MalformedRule { .. }), "{bad}: {err:?}");
        }
    }

    #[test]
    fn rules_must_be_an_array() {
        let err = RuleNode::from_json(&json!({"combinator": "and", "rules": {}})).unwrap_err();
        assert!(matches!(err, RuleError::MalformedRule { .. }));
    }

    #[test]
    fn missing_rules_parse_as_empty_group() {
        let node = RuleNode::from_json(&json!({"combinator": "and"})).unwrap();
        assert_eq!(node, RuleNode::group("and", vec![]));
    }

    #[test]
    fn null_value_is_absent_value() {
        let node =
            RuleNode::from_json(&json!({"field": "a", "operator": "equals", "value": null})).unwrap();
        assert_eq!(node, RuleNode::comparison("a", "equals", None));
    }

    #[test]
    fn deserializes_through_serde() {
        let node: RuleNode =
            serde_json::from_str(r#"{"field":"name","operator":"equals","value":"C"}"#).unwrap();
        assert_eq!(node, RuleNode::comparison("name", "equals", Some(json!("C"))));

        let err = serde_json::from_str::<RuleNode>(r#"{"value": 1}"#).unwrap_err();
        assert!(err.to_string().contains("malformed rule"));
    }

    #[test]
    fn invalid_json_text_is_malformed() {
        let err = RuleNode::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, RuleError::MalformedRule { .. }));
    }
}
