pub mod macros;

use biosphere_core::config::{EmitterKind, MergeOrder, SimConfig};
use biosphere_core::process::{PortSchema, Ports, Process, ProcessUpdate, StateView, Step};
use biosphere_core::{Engine, Registry, Result};
use biosphere_data::{CompositeSpec, ProcessDecl, Schema, Value};
use serde::Deserialize;

/// Adds `delta` to `target/value` every `timestep`.
#[derive(Debug, Deserialize)]
pub struct Adder {
    pub delta: Value,
    #[serde(default = "one")]
    pub timestep: f64,
    #[serde(default)]
    pub updater: Option<String>,
}

fn one() -> f64 {
    1.0
}

impl Process for Adder {
    fn ports_schema(&self) -> Ports {
        let kind = self.delta.kind();
        let schema = Schema::of_kind(kind, kind.zero()).split();
        let schema = match &self.updater {
            Some(name) if name == "replace" => schema.replace(),
            Some(name) => schema.custom(name),
            None => schema,
        };
        let mut ports = Ports::new();
        ports.insert("target".to_string(), PortSchema::new().with("value", schema));
        ports
    }

    fn next_update(&self, timestep: f64, _view: &StateView) -> anyhow::Result<Step> {
        Ok(Step::full(
            ProcessUpdate::new().with("target", "value", self.delta.clone()),
            timestep,
        ))
    }

    fn timestep(&self) -> f64 {
        self.timestep
    }
}

/// Records `source/value` into `source/seen` on every call, as a deriver.
#[derive(Debug, Deserialize)]
pub struct Recorder {}

impl Process for Recorder {
    fn ports_schema(&self) -> Ports {
        let mut ports = Ports::new();
        ports.insert(
            "source".to_string(),
            PortSchema::new()
                .with("value", Schema::float(0.0).split().read_only())
                .with("seen", Schema::float(0.0).replace().split()),
        );
        ports
    }

    fn next_update(&self, _timestep: f64, view: &StateView) -> anyhow::Result<Step> {
        let value = view.float("source", "value")?;
        Ok(Step::new(ProcessUpdate::new().with("source", "seen", value), 0.0))
    }

    fn is_deriver(&self) -> bool {
        true
    }
}

/// The reference processes plus the test helpers above.
pub fn registry() -> Registry {
    let mut registry = biosphere_lib::registry().expect("reference processes register");
    registry.register_type::<Adder>("adder").unwrap();
    registry.register_type::<Recorder>("recorder").unwrap();
    registry
}

pub fn adder(delta: impl Into<Value>, timestep: f64) -> ProcessDecl {
    ProcessDecl::new("adder").with_params(serde_json::json!({
        "delta": delta.into(),
        "timestep": timestep,
    }))
}

#[allow(dead_code)]
pub struct SimBuilder {
    config: SimConfig,
    spec: CompositeSpec,
    registry: Registry,
}

#[allow(dead_code)]
impl SimBuilder {
    pub fn new() -> Self {
        let mut config = SimConfig::default();
        config.emitter.kind = EmitterKind::Null;
        Self {
            config,
            spec: CompositeSpec::new(),
            registry: registry(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.engine.seed = seed;
        self
    }

    pub fn with_config<F>(mut self, modifier: F) -> Self
    where
        F: FnOnce(&mut SimConfig),
    {
        modifier(&mut self.config);
        self
    }

    pub fn shuffled(mut self) -> Self {
        self.config.engine.merge_order = MergeOrder::Shuffled;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.config.engine.parallel = false;
        self
    }

    pub fn with_spec(mut self, spec: CompositeSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_process(mut self, name: &str, decl: ProcessDecl) -> Self {
        self.spec = self.spec.with_process(name, decl);
        self
    }

    pub fn with_composite(mut self, path: &str, composite: CompositeSpec) -> Self {
        self.spec = self.spec.with_composite(path, composite);
        self
    }

    pub fn with_registry<F>(mut self, modifier: F) -> Self
    where
        F: FnOnce(&mut Registry),
    {
        modifier(&mut self.registry);
        self
    }

    pub fn try_build(self) -> Result<Engine> {
        Engine::from_spec(&self.spec, self.registry, self.config)
    }

    pub fn build(self) -> Engine {
        self.try_build().expect("Failed to build engine in test builder")
    }
}
