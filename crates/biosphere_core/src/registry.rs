//! Name-keyed tables of process constructors, custom updaters and custom
//! dividers. Declarations refer to entries by name; unknown names are
//! rejected when a composite is built.

use crate::error::ConfigError;
use crate::process::Process;
use anyhow::{anyhow, bail};
use biosphere_data::{DividerKind, Schema, UpdaterKind, Value};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type ProcessFactory =
    Arc<dyn Fn(&serde_json::Value) -> anyhow::Result<Box<dyn Process>> + Send + Sync>;

/// Folds a delta into the current value. Must be commutative over the deltas
/// of one round for the writers that share a leaf; the built-in `merge` only
/// is when those writers touch disjoint keys.
pub type UpdaterFn = Arc<dyn Fn(&Value, &Value) -> anyhow::Result<Value> + Send + Sync>;

/// Shares a mother's value between two daughters.
pub type DividerFn = Arc<dyn Fn(&Value) -> anyhow::Result<[Value; 2]> + Send + Sync>;

#[derive(Clone)]
pub struct Registry {
    processes: BTreeMap<String, ProcessFactory>,
    updaters: BTreeMap<String, UpdaterFn>,
    dividers: BTreeMap<String, DividerFn>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("processes", &self.processes.keys().collect::<Vec<_>>())
            .field("updaters", &self.updaters.keys().collect::<Vec<_>>())
            .field("dividers", &self.dividers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn numeric_pick(current: &Value, delta: &Value, take_delta: fn(f64, f64) -> bool) -> anyhow::Result<Value> {
    let (Some(a), Some(b)) = (current.as_f64(), delta.as_f64()) else {
        bail!("expected numbers, got {} and {}", current.kind(), delta.kind());
    };
    Ok(if take_delta(a, b) {
        delta.clone()
    } else {
        current.clone()
    })
}

fn boolean_op(current: &Value, delta: &Value, op: fn(bool, bool) -> bool) -> anyhow::Result<Value> {
    match (current.as_bool(), delta.as_bool()) {
        (Some(a), Some(b)) => Ok(Value::Bool(op(a, b))),
        _ => Err(anyhow!(
            "expected bools, got {} and {}",
            current.kind(),
            delta.kind()
        )),
    }
}

impl Registry {
    /// A registry holding only the built-in updaters `merge`, `max`, `min`,
    /// `and` and `or`.
    ///
    /// `merge` is a right-biased map union: a key written by two deltas in one
    /// round keeps the value merged last, so it is order-independent only
    /// over disjoint keys.
    #[must_use]
    pub fn new() -> Self {
        let mut updaters: BTreeMap<String, UpdaterFn> = BTreeMap::new();
        updaters.insert(
            "merge".to_string(),
            Arc::new(|current: &Value, delta: &Value| match (current, delta) {
                (Value::Map(a), Value::Map(b)) => {
                    let mut merged = a.clone();
                    merged.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
                    Ok(Value::Map(merged))
                }
                _ => Err(anyhow!("merge expects maps, got {}", delta.kind())),
            }),
        );
        updaters.insert(
            "max".to_string(),
            Arc::new(|current: &Value, delta: &Value| numeric_pick(current, delta, |a, b| b > a)),
        );
        updaters.insert(
            "min".to_string(),
            Arc::new(|current: &Value, delta: &Value| numeric_pick(current, delta, |a, b| b < a)),
        );
        updaters.insert(
            "and".to_string(),
            Arc::new(|current: &Value, delta: &Value| boolean_op(current, delta, |a, b| a && b)),
        );
        updaters.insert(
            "or".to_string(),
            Arc::new(|current: &Value, delta: &Value| boolean_op(current, delta, |a, b| a || b)),
        );
        Self {
            processes: BTreeMap::new(),
            updaters,
            dividers: BTreeMap::new(),
        }
    }

    pub fn register_process<F>(&mut self, kind: &str, factory: F) -> Result<(), ConfigError>
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<Box<dyn Process>> + Send + Sync + 'static,
    {
        if self.processes.contains_key(kind) {
            return Err(ConfigError::DuplicateRegistration {
                registry: "process",
                kind: kind.to_string(),
            });
        }
        self.processes.insert(kind.to_string(), Arc::new(factory));
        Ok(())
    }

    /// Registers a process type whose parameters deserialize into the
    /// process itself. Missing params mean an empty table.
    pub fn register_type<P>(&mut self, kind: &str) -> Result<(), ConfigError>
    where
        P: Process + DeserializeOwned + 'static,
    {
        self.register_process(kind, |params| {
            let params = if params.is_null() {
                serde_json::json!({})
            } else {
                params.clone()
            };
            let process: P = serde_json::from_value(params)?;
            Ok(Box::new(process) as Box<dyn Process>)
        })
    }

    pub fn register_updater<F>(&mut self, name: &str, updater: F) -> Result<(), ConfigError>
    where
        F: Fn(&Value, &Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        if self.updaters.contains_key(name) {
            return Err(ConfigError::DuplicateRegistration {
                registry: "updater",
                kind: name.to_string(),
            });
        }
        self.updaters.insert(name.to_string(), Arc::new(updater));
        Ok(())
    }

    pub fn register_divider<F>(&mut self, name: &str, divider: F) -> Result<(), ConfigError>
    where
        F: Fn(&Value) -> anyhow::Result<[Value; 2]> + Send + Sync + 'static,
    {
        if self.dividers.contains_key(name) {
            return Err(ConfigError::DuplicateRegistration {
                registry: "divider",
                kind: name.to_string(),
            });
        }
        self.dividers.insert(name.to_string(), Arc::new(divider));
        Ok(())
    }

    /// Instantiates a registered process type.
    pub fn construct(
        &self,
        kind: &str,
        params: &serde_json::Value,
    ) -> Result<Box<dyn Process>, ConfigError> {
        let factory = self
            .processes
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownProcessType(kind.to_string()))?;
        factory(params).map_err(|err| ConfigError::Construction {
            kind: kind.to_string(),
            reason: format!("{err:#}"),
        })
    }

    #[must_use]
    pub fn updater(&self, name: &str) -> Option<&UpdaterFn> {
        self.updaters.get(name)
    }

    #[must_use]
    pub fn divider(&self, name: &str) -> Option<&DividerFn> {
        self.dividers.get(name)
    }

    #[must_use]
    pub fn has_process(&self, kind: &str) -> bool {
        self.processes.contains_key(kind)
    }

    #[must_use]
    pub fn process_types(&self) -> Vec<&str> {
        self.processes.keys().map(String::as_str).collect()
    }

    /// Checks that custom names in `schema` are registered.
    pub fn check_schema(&self, schema: &Schema) -> Result<(), ConfigError> {
        if let UpdaterKind::Custom(name) = &schema.updater {
            if !self.updaters.contains_key(name) {
                return Err(ConfigError::UnknownUpdater(name.clone()));
            }
        }
        if let Some(DividerKind::Custom(name)) = &schema.divider {
            if !self.dividers.contains_key(name) {
                return Err(ConfigError::UnknownDivider(name.clone()));
            }
        }
        Ok(())
    }
}
