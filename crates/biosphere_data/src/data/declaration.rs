//! Declarative description of a composite, as produced by an external
//! configuration layer. Validation and instantiation live in the engine.

use super::path::Path;
use super::schema::Schema;
use super::state::StateTree;
use super::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One process of a composite: a registered type name, its construction
/// parameters and its port wiring relative to the composite's mount point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDecl {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub topology: BTreeMap<String, Path>,
    /// Overrides the process's own preferred timestep.
    #[serde(default)]
    pub timestep: Option<f64>,
}

impl ProcessDecl {
    pub fn new<S: Into<String>>(kind: S) -> Self {
        Self {
            kind: kind.into(),
            params: serde_json::Value::Null,
            topology: BTreeMap::new(),
            timestep: None,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: &str, path: &str) -> Self {
        self.topology.insert(port.to_string(), Path::parse(path));
        self
    }

    #[must_use]
    pub fn with_timestep(mut self, timestep: f64) -> Self {
        self.timestep = Some(timestep);
        self
    }
}

/// Processes, wiring, schema overrides and initial state of a composite.
/// Nested composites are mounted at paths relative to this one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeSpec {
    pub processes: BTreeMap<String, ProcessDecl>,
    pub schema: BTreeMap<Path, Schema>,
    pub structural: Vec<Path>,
    pub initial_state: StateTree,
    pub composites: BTreeMap<Path, CompositeSpec>,
}

impl CompositeSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_process(mut self, name: &str, decl: ProcessDecl) -> Self {
        self.processes.insert(name.to_string(), decl);
        self
    }

    #[must_use]
    pub fn with_schema(mut self, path: &str, schema: Schema) -> Self {
        self.schema.insert(Path::parse(path), schema);
        self
    }

    /// Marks a branch as accepting `_add`, `_delete` and `_divide`.
    #[must_use]
    pub fn with_structural(mut self, path: &str) -> Self {
        self.structural.push(Path::parse(path));
        self
    }

    #[must_use]
    pub fn with_state(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.initial_state.insert(&Path::parse(path), value.into());
        self
    }

    #[must_use]
    pub fn with_composite(mut self, path: &str, composite: CompositeSpec) -> Self {
        self.composites.insert(Path::parse(path), composite);
        self
    }

    /// Total number of processes including nested composites.
    #[must_use]
    pub fn process_count(&self) -> usize {
        self.processes.len()
            + self
                .composites
                .values()
                .map(CompositeSpec::process_count)
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::{DividerKind, UpdaterKind};

    #[test]
    fn test_builder() {
        let cell = CompositeSpec::new()
            .with_process(
                "growth",
                ProcessDecl::new("growth")
                    .with_params(serde_json::json!({ "rate": 0.1 }))
                    .with_port("internal", "internal"),
            )
            .with_schema("internal/volume", Schema::float(1.0).split())
            .with_state("internal/volume", 4.0);
        let colony = CompositeSpec::new()
            .with_structural("agents")
            .with_composite("agents/0", cell);

        assert_eq!(colony.process_count(), 1);
        assert_eq!(colony.structural, vec![Path::parse("agents")]);
    }

    #[test]
    fn test_declaration_from_toml() {
        let spec: CompositeSpec = toml::from_str(
            r#"
            structural = ["agents"]

            [processes.growth]
            type = "growth"
            timestep = 0.5
            params = { rate = 0.2 }
            topology = { internal = "agents/0/internal" }

            [schema."agents/0/internal/volume"]
            kind = "float"
            default = 1.0
            updater = "accumulate"
            divider = "split"

            [initial_state.agents.0.internal]
            volume = 4.0
            "#,
        )
        .unwrap();

        let growth = &spec.processes["growth"];
        assert_eq!(growth.kind, "growth");
        assert_eq!(growth.timestep, Some(0.5));
        assert_eq!(growth.topology["internal"], Path::parse("agents/0/internal"));

        let schema = &spec.schema[&Path::parse("agents/0/internal/volume")];
        assert_eq!(schema.updater, UpdaterKind::Accumulate);
        assert_eq!(schema.divider, Some(DividerKind::Split));
        assert_eq!(
            spec.initial_state
                .value(&Path::parse("agents/0/internal/volume")),
            Some(&Value::Float(4.0))
        );
    }
}
