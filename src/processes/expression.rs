//! Two-stage gene expression with an optional inducer.

use biosphere_core::process::{PortSchema, Ports, Process, ProcessUpdate, StateView, Step};
use biosphere_data::{DividerKind, Schema};
use serde::Deserialize;

/// Transcription, translation and first-order decay of one gene.
///
/// `d(mrna) = k_tx * f - d_m * mrna` and `d(protein) = k_tl * mrna - d_p *
/// protein`, where `f` is `induced_fold` while `global/inducer` is set and 1
/// otherwise. Integrated with forward Euler over the offered timestep, split
/// into substeps no longer than `max_substep`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Expression {
    pub transcription: f64,
    pub translation: f64,
    pub mrna_decay: f64,
    pub protein_decay: f64,
    pub induced_fold: f64,
    pub max_substep: f64,
    pub timestep: f64,
}

impl Default for Expression {
    fn default() -> Self {
        Self {
            transcription: 0.5,
            translation: 2.0,
            mrna_decay: 0.1,
            protein_decay: 0.01,
            induced_fold: 10.0,
            max_substep: 0.1,
            timestep: 0.1,
        }
    }
}

impl Process for Expression {
    fn ports_schema(&self) -> Ports {
        let mut ports = Ports::new();
        ports.insert(
            "molecules".to_string(),
            PortSchema::new()
                .with("mrna", Schema::float(0.0).split().emit())
                .with("protein", Schema::float(0.0).split().emit()),
        );
        ports.insert(
            "global".to_string(),
            PortSchema::new().with(
                "inducer",
                Schema::boolean(false).divider(DividerKind::Set).read_only(),
            ),
        );
        ports
    }

    /// Consumes at most `max_substep`; the engine re-invokes for the rest.
    fn next_update(&self, timestep: f64, view: &StateView) -> anyhow::Result<Step> {
        let mrna = view.float("molecules", "mrna")?;
        let protein = view.float("molecules", "protein")?;
        let fold = if view.boolean("global", "inducer")? {
            self.induced_fold
        } else {
            1.0
        };

        let dt = timestep.min(self.max_substep);
        let d_mrna = (self.transcription * fold - self.mrna_decay * mrna) * dt;
        let d_protein = (self.translation * mrna - self.protein_decay * protein) * dt;
        Ok(Step::new(
            ProcessUpdate::new()
                .with("molecules", "mrna", d_mrna.max(-mrna))
                .with("molecules", "protein", d_protein.max(-protein)),
            dt,
        ))
    }

    fn timestep(&self) -> f64 {
        self.timestep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biosphere_core::process::PortState;
    use biosphere_data::{Path, Value};
    use std::collections::BTreeMap;

    fn view(mrna: f64, protein: f64, inducer: bool) -> StateView {
        let mut view = StateView::new();
        view.insert(
            "molecules",
            PortState {
                path: Path::parse("molecules"),
                values: BTreeMap::from([
                    ("mrna".to_string(), Value::Float(mrna)),
                    ("protein".to_string(), Value::Float(protein)),
                ]),
                children: Vec::new(),
            },
        );
        view.insert(
            "global",
            PortState {
                path: Path::parse("global"),
                values: BTreeMap::from([("inducer".to_string(), Value::Bool(inducer))]),
                children: Vec::new(),
            },
        );
        view
    }

    fn delta(step: &Step, variable: &str) -> f64 {
        step.update.ports["molecules"].values[variable].as_f64().unwrap()
    }

    #[test]
    fn test_substeps_long_offers() {
        let expression = Expression::default();
        let step = expression.next_update(1.0, &view(0.0, 0.0, false)).unwrap();
        assert!((step.consumed - 0.1).abs() < 1e-12);
        assert!((delta(&step, "mrna") - 0.05).abs() < 1e-12);
        assert_eq!(delta(&step, "protein"), 0.0);
    }

    #[test]
    fn test_inducer_raises_transcription() {
        let expression = Expression::default();
        let plain = expression.next_update(0.1, &view(1.0, 0.0, false)).unwrap();
        let induced = expression.next_update(0.1, &view(1.0, 0.0, true)).unwrap();
        assert!(delta(&induced, "mrna") > delta(&plain, "mrna"));
        assert_eq!(delta(&induced, "protein"), delta(&plain, "protein"));
    }
}
