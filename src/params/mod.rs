//! Hyperparameter values and declarative parameter spaces
//!
//! A [`ParamValue`] is the tagged value type every model constructor
//! consumes; a [`ParamSpace`] describes, per hyperparameter, the range a
//! trial may sample from.

mod space;

pub use space::{ParamRange, ParamSpace, ParamSpec};

use serde::Serialize;
use std::collections::BTreeMap;

/// A concrete hyperparameter assignment, keyed by parameter name.
///
/// `BTreeMap` keeps snapshots deterministic when serialized.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// One typed hyperparameter value.
///
/// Serializes untagged: `None` becomes JSON null, tuples become arrays,
/// everything else its natural JSON form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// The native "absent" value, serialized as JSON null
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Fixed-arity integer tuple, e.g. MLP hidden layer sizes
    Tuple(Vec<i64>),
}

impl ParamValue {
    /// Numeric view; integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Integer view; floats with no fractional part narrow to i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_i64().and_then(|v| usize::try_from(v).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[i64]> {
        match self {
            ParamValue::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ParamValue::None)
    }

    /// Convert a JSON scalar into the matching variant.
    ///
    /// The string `"None"` maps to [`ParamValue::None`]; string booleans
    /// (`"True"`/`"true"`) map to [`ParamValue::Bool`] only when the caller
    /// asks for it via [`ParamSpace`] boolean detection, so here they stay
    /// strings.
    pub fn from_json(value: &serde_json::Value) -> ParamValue {
        match value {
            serde_json::Value::Null => ParamValue::None,
            serde_json::Value::Bool(b) => ParamValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ParamValue::Int(i)
                } else {
                    ParamValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) if s == "None" => ParamValue::None,
            other => ParamValue::Str(
                other
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| other.to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_views() {
        assert_eq!(ParamValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(ParamValue::Float(2.0).as_i64(), Some(2));
        assert_eq!(ParamValue::Float(2.5).as_i64(), None);
        assert_eq!(ParamValue::Str("x".into()).as_f64(), None);
    }

    #[test]
    fn test_from_json_none_sentinel() {
        let v = ParamValue::from_json(&serde_json::json!("None"));
        assert!(v.is_none());
        let v = ParamValue::from_json(&serde_json::json!(null));
        assert!(v.is_none());
    }

    #[test]
    fn test_serialize_untagged() {
        let mut map = ParamMap::new();
        map.insert("alpha".into(), ParamValue::Float(0.5));
        map.insert("hidden".into(), ParamValue::Tuple(vec![64, 32]));
        map.insert("max_features".into(), ParamValue::None);
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["alpha"], serde_json::json!(0.5));
        assert_eq!(json["hidden"], serde_json::json!([64, 32]));
        assert!(json["max_features"].is_null());
    }
}
