use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A scalar literal usable in union/intersection shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JsonLiteral {
    Int(i64),
    Text(String),
}

impl JsonLiteral {
    fn matches(&self, value: &JsonValue) -> bool {
        match self {
            JsonLiteral::Int(expected) => value.as_i64() == Some(*expected),
            JsonLiteral::Text(expected) => value.as_str() == Some(expected.as_str()),
        }
    }
}

impl std::fmt::Display for JsonLiteral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonLiteral::Int(v) => write!(f, "{v}"),
            JsonLiteral::Text(v) => write!(f, "\"{v}\""),
        }
    }
}

/// The closed grammar describing the structure of a `json`-kind column.
///
/// Arrays are homogeneous; object fields are required unless their shape is
/// [`JsonShape::Undef`] (which also matches an absent field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JsonShape {
    Int,
    Real,
    Text,
    Bool,
    Undef,
    Array(Box<JsonShape>),
    Object(BTreeMap<String, JsonShape>),
    Union(Vec<JsonLiteral>),
    Intersection(Vec<JsonLiteral>),
}

impl JsonShape {
    /// Convenience constructor for an object shape.
    #[must_use]
    pub fn object(fields: impl IntoIterator<Item = (&'static str, JsonShape)>) -> Self {
        JsonShape::Object(
            fields
                .into_iter()
                .map(|(name, shape)| (name.to_string(), shape))
                .collect(),
        )
    }

    /// Convenience constructor for a homogeneous array shape.
    #[must_use]
    pub fn array(inner: JsonShape) -> Self {
        JsonShape::Array(Box::new(inner))
    }

    /// Whether a field of this shape may be absent from an object value.
    #[must_use]
    fn is_optional(&self) -> bool {
        matches!(self, JsonShape::Undef)
    }

    /// Validate a JSON value against this shape.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first mismatch.
    pub fn validate_value(&self, value: &JsonValue) -> Result<(), String> {
        match self {
            JsonShape::Int => {
                if value.as_i64().is_some() {
                    Ok(())
                } else {
                    Err(format!("expected integer, got {value}"))
                }
            }
            JsonShape::Real => {
                if value.is_number() {
                    Ok(())
                } else {
                    Err(format!("expected number, got {value}"))
                }
            }
            JsonShape::Text => {
                if value.is_string() {
                    Ok(())
                } else {
                    Err(format!("expected string, got {value}"))
                }
            }
            JsonShape::Bool => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err(format!("expected boolean, got {value}"))
                }
            }
            JsonShape::Undef => {
                if value.is_null() {
                    Ok(())
                } else {
                    Err(format!("expected null, got {value}"))
                }
            }
            JsonShape::Array(inner) => {
                let Some(items) = value.as_array() else {
                    return Err(format!("expected array, got {value}"));
                };
                for (idx, item) in items.iter().enumerate() {
                    inner
                        .validate_value(item)
                        .map_err(|reason| format!("at index {idx}: {reason}"))?;
                }
                Ok(())
            }
            JsonShape::Object(fields) => {
                let Some(map) = value.as_object() else {
                    return Err(format!("expected object, got {value}"));
                };
                for (name, shape) in fields {
                    match map.get(name) {
                        Some(field_value) => shape
                            .validate_value(field_value)
                            .map_err(|reason| format!("in field '{name}': {reason}"))?,
                        None if shape.is_optional() => {}
                        None => return Err(format!("missing field '{name}'")),
                    }
                }
                // The grammar is closed; unknown fields are rejected.
                for name in map.keys() {
                    if !fields.contains_key(name) {
                        return Err(format!("unknown field '{name}'"));
                    }
                }
                Ok(())
            }
            JsonShape::Union(literals) => {
                if literals.iter().any(|lit| lit.matches(value)) {
                    Ok(())
                } else {
                    Err(format!("{value} is not one of the permitted literals"))
                }
            }
            JsonShape::Intersection(literals) => {
                if literals.iter().all(|lit| lit.matches(value)) {
                    Ok(())
                } else {
                    Err(format!("{value} does not satisfy every literal"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_shapes() {
        assert!(JsonShape::Int.validate_value(&json!(3)).is_ok());
        assert!(JsonShape::Int.validate_value(&json!(3.5)).is_err());
        assert!(JsonShape::Real.validate_value(&json!(3.5)).is_ok());
        assert!(JsonShape::Real.validate_value(&json!(3)).is_ok());
        assert!(JsonShape::Text.validate_value(&json!("x")).is_ok());
        assert!(JsonShape::Bool.validate_value(&json!(true)).is_ok());
        assert!(JsonShape::Undef.validate_value(&json!(null)).is_ok());
        assert!(JsonShape::Undef.validate_value(&json!(0)).is_err());
    }

    #[test]
    fn array_is_homogeneous() {
        let shape = JsonShape::array(JsonShape::Int);
        assert!(shape.validate_value(&json!([1, 2, 3])).is_ok());
        assert!(shape.validate_value(&json!([1, "two"])).is_err());
        assert!(shape.validate_value(&json!([])).is_ok());
    }

    #[test]
    fn object_fields_required_unless_undef() {
        let shape = JsonShape::object([
            ("street", JsonShape::Text),
            ("floor", JsonShape::Undef),
        ]);
        assert!(shape.validate_value(&json!({"street": "main"})).is_ok());
        assert!(shape.validate_value(&json!({})).is_err());
        assert!(
            shape
                .validate_value(&json!({"street": "main", "extra": 1}))
                .is_err()
        );
    }

    #[test]
    fn union_of_literals() {
        let shape = JsonShape::Union(vec![
            JsonLiteral::Text("a".into()),
            JsonLiteral::Int(1),
        ]);
        assert!(shape.validate_value(&json!("a")).is_ok());
        assert!(shape.validate_value(&json!(1)).is_ok());
        assert!(shape.validate_value(&json!("b")).is_err());
    }

    #[test]
    fn intersection_requires_all() {
        let shape = JsonShape::Intersection(vec![JsonLiteral::Int(1)]);
        assert!(shape.validate_value(&json!(1)).is_ok());
        assert!(shape.validate_value(&json!(2)).is_err());
    }
}
