use super::value::{Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("default {default} does not match declared kind {kind}")]
    DefaultKind { kind: ValueKind, default: ValueKind },
    #[error("updater accumulate is not defined for kind {0}")]
    NotAdditive(ValueKind),
    #[error("divider split is not defined for kind {0}")]
    NotSplittable(ValueKind),
    #[error("divider split_map requires a map, found {0}")]
    NotMap(ValueKind),
}

/// Physical unit symbol attached to a leaf, e.g. `fg` or `mmol/L`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Unit(String);

impl Unit {
    pub fn new<S: Into<String>>(symbol: S) -> Self {
        Self(symbol.into())
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How updates to a leaf are folded into its current value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpdaterKind {
    /// The update replaces the value. At most one writer per round.
    #[serde(alias = "set")]
    Replace,
    /// The update is added to the value.
    #[default]
    Accumulate,
    /// A named updater from the registry. Must be commutative within a round.
    Custom(String),
}

impl fmt::Display for UpdaterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdaterKind::Replace => write!(f, "replace"),
            UpdaterKind::Accumulate => write!(f, "accumulate"),
            UpdaterKind::Custom(name) => write!(f, "custom({name})"),
        }
    }
}

/// How a leaf is shared between the two daughters of a division.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DividerKind {
    /// Both daughters receive a copy.
    Set,
    /// Quantity-like values are halved.
    Split,
    /// Both daughters start from zero.
    Zero,
    /// A map's keys are dealt out, first half to one daughter.
    SplitMap,
    /// A named divider from the registry.
    Custom(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    #[default]
    ReadWrite,
    ReadOnly,
}

/// Declaration of one state variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub kind: ValueKind,
    pub unit: Option<Unit>,
    pub default: Value,
    pub updater: UpdaterKind,
    pub divider: Option<DividerKind>,
    /// Whether the leaf is included in emitted timeseries.
    pub emit: bool,
    /// Reads of a missing value fail instead of falling back to `default`.
    pub required: bool,
    pub access: Access,
    pub properties: BTreeMap<String, Value>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            kind: ValueKind::Float,
            unit: None,
            default: Value::Float(0.0),
            updater: UpdaterKind::Accumulate,
            divider: None,
            emit: false,
            required: false,
            access: Access::ReadWrite,
            properties: BTreeMap::new(),
        }
    }
}

impl Schema {
    #[must_use]
    pub fn of_kind(kind: ValueKind, default: Value) -> Self {
        Self {
            kind,
            default,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn float(default: f64) -> Self {
        Self::of_kind(ValueKind::Float, Value::Float(default))
    }

    #[must_use]
    pub fn int(default: i64) -> Self {
        Self::of_kind(ValueKind::Int, Value::Int(default))
    }

    #[must_use]
    pub fn boolean(default: bool) -> Self {
        Self::of_kind(ValueKind::Bool, Value::Bool(default)).replace()
    }

    #[must_use]
    pub fn text(default: &str) -> Self {
        Self::of_kind(ValueKind::Text, Value::Text(default.to_string())).replace()
    }

    #[must_use]
    pub fn array(default: Vec<f64>) -> Self {
        Self::of_kind(ValueKind::Array, Value::Array(default))
    }

    #[must_use]
    pub fn map() -> Self {
        Self::of_kind(ValueKind::Map, Value::Map(BTreeMap::new()))
    }

    /// Schema for a value that arrived without a declaration: kind taken from
    /// the value, replaced on update, no divider.
    #[must_use]
    pub fn infer(value: &Value) -> Self {
        Self::of_kind(value.kind(), value.clone()).replace()
    }

    #[must_use]
    pub fn replace(mut self) -> Self {
        self.updater = UpdaterKind::Replace;
        self
    }

    #[must_use]
    pub fn accumulate(mut self) -> Self {
        self.updater = UpdaterKind::Accumulate;
        self
    }

    #[must_use]
    pub fn custom(mut self, name: &str) -> Self {
        self.updater = UpdaterKind::Custom(name.to_string());
        self
    }

    #[must_use]
    pub fn divider(mut self, divider: DividerKind) -> Self {
        self.divider = Some(divider);
        self
    }

    #[must_use]
    pub fn split(self) -> Self {
        self.divider(DividerKind::Split)
    }

    #[must_use]
    pub fn unit(mut self, symbol: &str) -> Self {
        self.unit = Some(Unit::new(symbol));
        self
    }

    #[must_use]
    pub fn emit(mut self) -> Self {
        self.emit = true;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    #[must_use]
    pub fn property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn is_writer(&self) -> bool {
        self.access == Access::ReadWrite
    }

    /// Checks the declaration is internally consistent. Named custom
    /// updaters and dividers are checked against a registry elsewhere.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if !self.kind.accepts(self.default.kind()) {
            return Err(SchemaError::DefaultKind {
                kind: self.kind,
                default: self.default.kind(),
            });
        }
        if self.updater == UpdaterKind::Accumulate && !self.kind.is_additive() {
            return Err(SchemaError::NotAdditive(self.kind));
        }
        match self.divider {
            Some(DividerKind::Split)
                if !(self.kind.is_additive() && self.kind != ValueKind::Any) =>
            {
                Err(SchemaError::NotSplittable(self.kind))
            }
            Some(DividerKind::SplitMap) if self.kind != ValueKind::Map => {
                Err(SchemaError::NotMap(self.kind))
            }
            _ => Ok(()),
        }
    }
}
