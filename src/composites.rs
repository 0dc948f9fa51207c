//! Declarations of the bundled composites.
//!
//! These only build [`CompositeSpec`] values; the engine validates and
//! instantiates them against a registry holding the reference processes.

use biosphere_data::{CompositeSpec, ProcessDecl};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Knobs of the single-cell composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellOptions {
    pub growth_rate: f64,
    pub initial_mass: f64,
    pub division_mass: f64,
    pub growth_timestep: f64,
    pub expression: bool,
    pub max_age: Option<f64>,
}

impl Default for CellOptions {
    fn default() -> Self {
        Self {
            growth_rate: 0.05,
            initial_mass: 1339.0,
            division_mass: 2678.0,
            growth_timestep: 1.0,
            expression: false,
            max_age: None,
        }
    }
}

/// One cell, meant to be mounted as a child of a structural `agents` branch.
///
/// Layout below the mount: `internal/mass`, `global/volume`, plus
/// `molecules/*` with expression and `age` with a lifespan.
#[must_use]
pub fn cell(options: &CellOptions) -> CompositeSpec {
    let mut spec = CompositeSpec::new()
        .with_process(
            "growth",
            ProcessDecl::new("growth")
                .with_params(json!({
                    "rate": options.growth_rate,
                    "initial_mass": options.initial_mass,
                    "timestep": options.growth_timestep,
                }))
                .with_port("internal", "internal"),
        )
        .with_process(
            "volume",
            ProcessDecl::new("volume")
                .with_port("internal", "internal")
                .with_port("global", "global"),
        )
        .with_process(
            "divide",
            ProcessDecl::new("divide")
                .with_params(json!({ "threshold": options.division_mass }))
                .with_port("internal", "internal")
                .with_port("cell", ".")
                .with_port("agents", ".."),
        );
    if options.expression {
        spec = spec.with_process(
            "expression",
            ProcessDecl::new("expression")
                .with_port("molecules", "molecules")
                .with_port("global", "global"),
        );
    }
    if let Some(max_age) = options.max_age {
        spec = spec.with_process(
            "lifespan",
            ProcessDecl::new("lifespan")
                .with_params(json!({ "max_age": max_age }))
                .with_port("cell", ".")
                .with_port("agents", ".."),
        );
    }
    spec
}

/// `cells` copies of [`cell`] under the structural branch `agents`, keyed
/// `0`, `1`, ...
#[must_use]
pub fn colony(cells: usize, options: &CellOptions) -> CompositeSpec {
    let template = cell(options);
    (0..cells).fold(
        CompositeSpec::new().with_structural("agents"),
        |spec, i| spec.with_composite(&format!("agents/{i}"), template.clone()),
    )
}

/// A single compartment mixing three clocks: expression every 0.1 s, growth
/// every second and a timeline that switches the inducer on at `induce_at`.
#[must_use]
pub fn timescales(induce_at: f64) -> CompositeSpec {
    CompositeSpec::new()
        .with_process(
            "expression",
            ProcessDecl::new("expression")
                .with_port("molecules", "molecules")
                .with_port("global", "global"),
        )
        .with_process(
            "growth",
            ProcessDecl::new("growth")
                .with_params(json!({ "rate": 0.01 }))
                .with_port("internal", "internal"),
        )
        .with_process(
            "timeline",
            ProcessDecl::new("timeline")
                .with_params(json!({
                    "events": [{ "at": induce_at, "variable": "inducer", "value": true }],
                }))
                .with_port("targets", "global")
                .with_port("global", "global")
                .with_timestep(0.5),
        )
        .with_process(
            "volume",
            ProcessDecl::new("volume")
                .with_port("internal", "internal")
                .with_port("global", "global"),
        )
}
