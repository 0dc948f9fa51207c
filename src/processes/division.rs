//! Processes that change the shape of the tree: division past a mass
//! threshold and removal at the end of a lifespan.

use anyhow::anyhow;
use biosphere_core::process::{PortSchema, Ports, Process, ProcessUpdate, StateView, Step};
use biosphere_data::{Directive, DividerKind, Schema};
use serde::Deserialize;

/// Key of the cell a process is mounted in, taken from its `cell` port.
fn cell_key(view: &StateView) -> anyhow::Result<String> {
    view.path("cell")?
        .last()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("cell port is bound to the root"))
}

/// Asks the enclosing colony to divide this cell once its mass reaches
/// `threshold`. Runs as a deriver so the division lands in the round the
/// threshold is crossed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DivisionTrigger {
    pub threshold: f64,
}

impl Default for DivisionTrigger {
    fn default() -> Self {
        Self { threshold: 2678.0 }
    }
}

impl Process for DivisionTrigger {
    fn ports_schema(&self) -> Ports {
        let mut ports = Ports::new();
        ports.insert(
            "internal".to_string(),
            PortSchema::new().with("mass", Schema::float(0.0).split().read_only()),
        );
        ports.insert("cell".to_string(), PortSchema::new());
        ports.insert("agents".to_string(), PortSchema::new().structural());
        ports
    }

    fn next_update(&self, timestep: f64, view: &StateView) -> anyhow::Result<Step> {
        let mass = view.float("internal", "mass")?;
        let mut update = ProcessUpdate::new();
        if mass >= self.threshold {
            update.directive("agents", Directive::divide(&cell_key(view)?));
        }
        Ok(Step::new(update, timestep))
    }

    fn is_deriver(&self) -> bool {
        true
    }
}

/// Ages a cell and removes it from its colony after `max_age`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Lifespan {
    pub max_age: f64,
    pub timestep: f64,
}

impl Default for Lifespan {
    fn default() -> Self {
        Self {
            max_age: 3600.0,
            timestep: 1.0,
        }
    }
}

impl Process for Lifespan {
    fn ports_schema(&self) -> Ports {
        let mut ports = Ports::new();
        ports.insert(
            "cell".to_string(),
            PortSchema::new().with(
                "age",
                Schema::float(0.0).unit("s").divider(DividerKind::Zero),
            ),
        );
        ports.insert("agents".to_string(), PortSchema::new().structural());
        ports
    }

    fn next_update(&self, timestep: f64, view: &StateView) -> anyhow::Result<Step> {
        let age = view.float("cell", "age")?;
        let mut update = ProcessUpdate::new().with("cell", "age", timestep);
        if age + timestep >= self.max_age {
            update.directive("agents", Directive::delete(&cell_key(view)?));
        }
        Ok(Step::full(update, timestep))
    }

    fn timestep(&self) -> f64 {
        self.timestep
    }
}
