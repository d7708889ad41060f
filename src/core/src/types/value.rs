//! Attribute values handed back to the policy engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// A resolved attribute value.
///
/// `Multi` keeps encounter order; callers treat it as a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttributeValue {
    /// Typed null
    Null,
    /// Scalar string
    Single(String),
    /// Multivalue
    Multi(Vec<String>),
}

impl AttributeValue {
    /// Empty multivalue, used for absent multi-cardinality attributes
    pub fn empty_multi() -> Self {
        AttributeValue::Multi(Vec::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, AttributeValue::Multi(_))
    }

    /// Scalar view, `None` for nulls and multivalues
    pub fn as_single(&self) -> Option<&str> {
        match self {
            AttributeValue::Single(s) => Some(s),
            _ => None,
        }
    }

    /// Multivalue view, `None` for nulls and scalars
    pub fn as_multi(&self) -> Option<&[String]> {
        match self {
            AttributeValue::Multi(values) => Some(values),
            _ => None,
        }
    }

    /// Approximate heap footprint in bytes
    pub fn approx_size(&self) -> usize {
        match self {
            AttributeValue::Null => 0,
            AttributeValue::Single(s) => s.len(),
            AttributeValue::Multi(values) => values.iter().map(|v| v.len()).sum(),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Single(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Single(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        AttributeValue::Multi(values)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "null"),
            AttributeValue::Single(s) => write!(f, "{}", s),
            AttributeValue::Multi(values) => write!(f, "[{}]", values.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_views() {
        let single = AttributeValue::from("Jake");
        assert_eq!(single.as_single(), Some("Jake"));
        assert!(single.as_multi().is_none());

        let multi = AttributeValue::from(vec!["a@x".to_string(), "b@x".to_string()]);
        assert!(multi.is_multi());
        assert_eq!(multi.as_multi().unwrap().len(), 2);

        assert!(AttributeValue::Null.is_null());
        assert_eq!(AttributeValue::empty_multi().as_multi(), Some(&[][..]));
    }

    #[test]
    fn test_display() {
        let multi = AttributeValue::Multi(vec!["a@x".into(), "b@x".into()]);
        assert_eq!(multi.to_string(), "[a@x, b@x]");
        assert_eq!(AttributeValue::Null.to_string(), "null");
    }

    #[test]
    fn test_serde_shape() {
        let multi = AttributeValue::Multi(vec!["sloc-1".into()]);
        let json = serde_json::to_string(&multi).unwrap();
        assert_eq!(json, r#"{"type":"multi","value":["sloc-1"]}"#);

        let null: AttributeValue = serde_json::from_str(r#"{"type":"null"}"#).unwrap();
        assert!(null.is_null());
    }
}
