use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("cannot accumulate {delta} into {current}")]
    Accumulate { current: ValueKind, delta: ValueKind },
    #[error("array length mismatch: {current} vs {delta}")]
    ArrayLength { current: usize, delta: usize },
    #[error("integer overflow adding {delta} to {current}")]
    Overflow { current: i64, delta: i64 },
}

/// A leaf value in the state tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Array(Vec<f64>),
    Map(BTreeMap<String, Value>),
}

/// Declared kind of a leaf. `Number` admits floats and integers, `Any` admits
/// everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    #[default]
    Float,
    Int,
    Number,
    Bool,
    Text,
    Array,
    Map,
    Any,
}

impl ValueKind {
    /// Whether a value of kind `other` may be stored under this kind.
    #[must_use]
    pub fn accepts(self, other: ValueKind) -> bool {
        match (self, other) {
            (ValueKind::Any, _) => true,
            (ValueKind::Number, ValueKind::Float | ValueKind::Int | ValueKind::Number) => true,
            // an integer delta is fine for a float leaf
            (ValueKind::Float, ValueKind::Int) => true,
            (a, b) => a == b,
        }
    }

    /// Symmetric check used when two declarations meet on one leaf.
    #[must_use]
    pub fn is_compatible_with(self, other: ValueKind) -> bool {
        self.accepts(other) || other.accepts(self)
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Float | ValueKind::Int | ValueKind::Number)
    }

    /// Whether `accumulate` has a meaning for this kind.
    #[must_use]
    pub fn is_additive(self) -> bool {
        self.is_numeric() || matches!(self, ValueKind::Array | ValueKind::Map | ValueKind::Any)
    }

    #[must_use]
    pub fn zero(self) -> Value {
        match self {
            ValueKind::Int => Value::Int(0),
            ValueKind::Float | ValueKind::Number | ValueKind::Any => Value::Float(0.0),
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Text => Value::Text(String::new()),
            ValueKind::Array => Value::Array(Vec::new()),
            ValueKind::Map => Value::Map(BTreeMap::new()),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Float => "float",
            ValueKind::Int => "int",
            ValueKind::Number => "number",
            ValueKind::Bool => "bool",
            ValueKind::Text => "text",
            ValueKind::Array => "array",
            ValueKind::Map => "map",
            ValueKind::Any => "any",
        };
        write!(f, "{name}")
    }
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Array(_) => ValueKind::Array,
            Value::Map(_) => ValueKind::Map,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[f64]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Converts integers stored under a float leaf so later sums stay floats.
    #[must_use]
    pub fn coerce(self, kind: ValueKind) -> Value {
        match (kind, self) {
            (ValueKind::Float, Value::Int(v)) => Value::Float(v as f64),
            (_, value) => value,
        }
    }

    /// Sum of `self` and `delta`. Maps add key-wise and take the union of
    /// keys, so the operation is commutative and associative.
    pub fn accumulate(&self, delta: &Value) -> Result<Value, ValueError> {
        match (self, delta) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or(ValueError::Overflow {
                    current: *a,
                    delta: *b,
                }),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
            (Value::Array(a), Value::Array(b)) => {
                if a.len() != b.len() {
                    return Err(ValueError::ArrayLength {
                        current: a.len(),
                        delta: b.len(),
                    });
                }
                Ok(Value::Array(a.iter().zip(b).map(|(x, y)| x + y).collect()))
            }
            (Value::Map(a), Value::Map(b)) => {
                let mut merged = a.clone();
                for (key, value) in b {
                    let next = match merged.get(key) {
                        Some(existing) => existing.accumulate(value)?,
                        None => value.clone(),
                    };
                    merged.insert(key.clone(), next);
                }
                Ok(Value::Map(merged))
            }
            _ => Err(ValueError::Accumulate {
                current: self.kind(),
                delta: delta.kind(),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Array(v) => write!(f, "{v:?}"),
            Value::Map(v) => {
                write!(f, "{{")?;
                for (i, (key, value)) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_acceptance() {
        assert!(ValueKind::Number.accepts(ValueKind::Int));
        assert!(ValueKind::Float.accepts(ValueKind::Int));
        assert!(!ValueKind::Int.accepts(ValueKind::Float));
        assert!(ValueKind::Int.is_compatible_with(ValueKind::Number));
        assert!(!ValueKind::Bool.is_compatible_with(ValueKind::Float));
        assert!(ValueKind::Any.accepts(ValueKind::Text));
    }

    #[test]
    fn test_accumulate_scalars_and_arrays() {
        let v = Value::Float(1.5).accumulate(&Value::Int(2)).unwrap();
        assert_eq!(v, Value::Float(3.5));

        let arr = Value::Array(vec![1.0, 2.0])
            .accumulate(&Value::Array(vec![0.5, 0.5]))
            .unwrap();
        assert_eq!(arr, Value::Array(vec![1.5, 2.5]));

        assert!(matches!(
            Value::Array(vec![1.0]).accumulate(&Value::Array(vec![1.0, 2.0])),
            Err(ValueError::ArrayLength { .. })
        ));
        assert!(Value::Bool(true).accumulate(&Value::Bool(true)).is_err());
    }

    #[test]
    fn test_accumulate_mixed_numbers_in_either_order() {
        assert_eq!(
            Value::Int(2).accumulate(&Value::Float(1.5)).unwrap(),
            Value::Float(3.5)
        );
        assert_eq!(
            Value::Float(1.5).accumulate(&Value::Int(2)).unwrap(),
            Value::Int(2).accumulate(&Value::Float(1.5)).unwrap()
        );
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        assert_eq!(
            Value::Int(i64::MAX).accumulate(&Value::Int(1)),
            Err(ValueError::Overflow {
                current: i64::MAX,
                delta: 1
            })
        );
        assert!(Value::Int(i64::MIN).accumulate(&Value::Int(-1)).is_err());
        assert_eq!(
            Value::Int(i64::MAX).accumulate(&Value::Int(-1)).unwrap(),
            Value::Int(i64::MAX - 1)
        );
    }

    #[test]
    fn test_accumulate_maps_is_keywise_union() {
        let mut a = BTreeMap::new();
        a.insert("glc".to_string(), Value::Float(1.0));
        let mut b = BTreeMap::new();
        b.insert("glc".to_string(), Value::Float(2.0));
        b.insert("lac".to_string(), Value::Float(3.0));

        let ab = Value::Map(a.clone()).accumulate(&Value::Map(b.clone())).unwrap();
        let ba = Value::Map(b).accumulate(&Value::Map(a)).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.as_map().unwrap()["glc"], Value::Float(3.0));
    }

    #[test]
    fn test_untagged_deserialization() {
        assert_eq!(serde_json::from_str::<Value>("4").unwrap(), Value::Int(4));
        assert_eq!(serde_json::from_str::<Value>("4.0").unwrap(), Value::Float(4.0));
        assert_eq!(
            serde_json::from_str::<Value>("[1, 2.5]").unwrap(),
            Value::Array(vec![1.0, 2.5])
        );
    }
}
