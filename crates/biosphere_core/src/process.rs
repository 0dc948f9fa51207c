//! The process plugin contract.
//!
//! A process sees the world only through its ports: it declares them in
//! [`Process::ports_schema`], receives a plain-value [`StateView`] of them and
//! answers with a port-relative [`ProcessUpdate`]. It never holds references
//! into the store.

use anyhow::{anyhow, Context};
use biosphere_data::{Directive, Path, Schema, Value};
use std::collections::BTreeMap;

/// Variables reachable through one port.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortSchema {
    pub variables: BTreeMap<String, Schema>,
    /// The port may carry `_add`, `_delete` and `_divide` directives and
    /// exposes the child keys of its branch.
    pub structural: bool,
}

impl PortSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &str, schema: Schema) -> Self {
        self.variables.insert(name.to_string(), schema);
        self
    }

    #[must_use]
    pub fn structural(mut self) -> Self {
        self.structural = true;
        self
    }
}

pub type Ports = BTreeMap<String, PortSchema>;

/// Values of one port as of the start of the round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortState {
    pub path: Path,
    pub values: BTreeMap<String, Value>,
    pub children: Vec<String>,
}

/// Read-only copy of the state at a process's ports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateView {
    ports: BTreeMap<String, PortState>,
}

impl StateView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, port: &str, state: PortState) {
        self.ports.insert(port.to_string(), state);
    }

    pub fn port(&self, port: &str) -> anyhow::Result<&PortState> {
        self.ports
            .get(port)
            .ok_or_else(|| anyhow!("no port named {port:?}"))
    }

    pub fn get(&self, port: &str, variable: &str) -> anyhow::Result<&Value> {
        self.port(port)?
            .values
            .get(variable)
            .ok_or_else(|| anyhow!("port {port:?} has no variable {variable:?}"))
    }

    pub fn float(&self, port: &str, variable: &str) -> anyhow::Result<f64> {
        let value = self.get(port, variable)?;
        value
            .as_f64()
            .with_context(|| format!("{port}/{variable} is {value}, not a number"))
    }

    pub fn int(&self, port: &str, variable: &str) -> anyhow::Result<i64> {
        let value = self.get(port, variable)?;
        value
            .as_i64()
            .with_context(|| format!("{port}/{variable} is {value}, not an integer"))
    }

    pub fn boolean(&self, port: &str, variable: &str) -> anyhow::Result<bool> {
        let value = self.get(port, variable)?;
        value
            .as_bool()
            .with_context(|| format!("{port}/{variable} is {value}, not a bool"))
    }

    pub fn text(&self, port: &str, variable: &str) -> anyhow::Result<&str> {
        let value = self.get(port, variable)?;
        value
            .as_str()
            .with_context(|| format!("{port}/{variable} is {value}, not text"))
    }

    /// Child keys of a structural port's branch.
    pub fn children(&self, port: &str) -> anyhow::Result<&[String]> {
        Ok(&self.port(port)?.children)
    }

    /// Absolute store path a port is bound to.
    pub fn path(&self, port: &str) -> anyhow::Result<&Path> {
        Ok(&self.port(port)?.path)
    }
}

/// Changes proposed for one port.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortDelta {
    pub values: BTreeMap<String, Value>,
    pub directives: Vec<Directive>,
}

/// A port-relative update. The engine translates it to absolute paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessUpdate {
    pub ports: BTreeMap<String, PortDelta>,
}

impl ProcessUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, port: &str, variable: &str, value: impl Into<Value>) {
        self.ports
            .entry(port.to_string())
            .or_default()
            .values
            .insert(variable.to_string(), value.into());
    }

    #[must_use]
    pub fn with(mut self, port: &str, variable: &str, value: impl Into<Value>) -> Self {
        self.set(port, variable, value);
        self
    }

    pub fn directive(&mut self, port: &str, directive: Directive) {
        self.ports
            .entry(port.to_string())
            .or_default()
            .directives
            .push(directive);
    }

    #[must_use]
    pub fn with_directive(mut self, port: &str, directive: Directive) -> Self {
        self.directive(port, directive);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ports
            .values()
            .all(|delta| delta.values.is_empty() && delta.directives.is_empty())
    }
}

/// Result of one invocation: the update and the time it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub update: ProcessUpdate,
    pub consumed: f64,
}

impl Step {
    #[must_use]
    pub fn new(update: ProcessUpdate, consumed: f64) -> Self {
        Self { update, consumed }
    }

    /// Consumes the whole offered timestep.
    #[must_use]
    pub fn full(update: ProcessUpdate, timestep: f64) -> Self {
        Self::new(update, timestep)
    }
}

/// A unit of computation over the shared state.
///
/// Implementations must be deterministic functions of their parameters, the
/// view and the timestep. They are invoked from worker threads.
pub trait Process: Send + Sync {
    /// Ports and the variables each one reads or writes.
    fn ports_schema(&self) -> Ports;

    /// Computes the update for at most `timestep` of simulated time.
    /// `consumed` must lie in `(0, timestep]`; derivers get `timestep = 0`.
    fn next_update(&self, timestep: f64, view: &StateView) -> anyhow::Result<Step>;

    /// Preferred timestep, unless the declaration overrides it.
    fn timestep(&self) -> f64 {
        1.0
    }

    /// Derivers are not clock-scheduled; they run after every round.
    fn is_deriver(&self) -> bool {
        false
    }
}
