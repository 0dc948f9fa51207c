//! Cell growth and the size variables derived from it.

use biosphere_core::process::{PortSchema, Ports, Process, ProcessUpdate, StateView, Step};
use biosphere_data::{DividerKind, Schema};
use serde::Deserialize;

/// Exponential mass growth, `dm = rate * m * dt`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Growth {
    pub rate: f64,
    pub initial_mass: f64,
    pub timestep: f64,
}

impl Default for Growth {
    fn default() -> Self {
        Self {
            rate: 0.0005,
            initial_mass: 1339.0,
            timestep: 1.0,
        }
    }
}

impl Process for Growth {
    fn ports_schema(&self) -> Ports {
        let mut ports = Ports::new();
        ports.insert(
            "internal".to_string(),
            PortSchema::new().with(
                "mass",
                Schema::float(self.initial_mass).unit("fg").split().emit(),
            ),
        );
        ports
    }

    fn next_update(&self, timestep: f64, view: &StateView) -> anyhow::Result<Step> {
        let mass = view.float("internal", "mass")?;
        let grown = mass * (self.rate * timestep).exp_m1();
        Ok(Step::full(
            ProcessUpdate::new().with("internal", "mass", grown),
            timestep,
        ))
    }

    fn timestep(&self) -> f64 {
        self.timestep
    }
}

/// Keeps `global/volume` in step with `internal/mass`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Volume {
    /// fg per fL
    pub density: f64,
}

impl Default for Volume {
    fn default() -> Self {
        Self { density: 1100.0 }
    }
}

impl Process for Volume {
    fn ports_schema(&self) -> Ports {
        let mut ports = Ports::new();
        ports.insert(
            "internal".to_string(),
            PortSchema::new().with("mass", Schema::float(0.0).split().read_only()),
        );
        ports.insert(
            "global".to_string(),
            PortSchema::new().with(
                "volume",
                Schema::float(0.0)
                    .unit("fL")
                    .replace()
                    .divider(DividerKind::Split)
                    .emit(),
            ),
        );
        ports
    }

    fn next_update(&self, _timestep: f64, view: &StateView) -> anyhow::Result<Step> {
        anyhow::ensure!(self.density > 0.0, "density must be positive, got {}", self.density);
        let mass = view.float("internal", "mass")?;
        Ok(Step::new(
            ProcessUpdate::new().with("global", "volume", mass / self.density),
            0.0,
        ))
    }

    fn is_deriver(&self) -> bool {
        true
    }
}
