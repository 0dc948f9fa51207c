//! Scheduled external changes.

use biosphere_core::process::{PortSchema, Ports, Process, ProcessUpdate, StateView, Step};
use biosphere_data::{DividerKind, Schema, Value};
use serde::Deserialize;

/// One scheduled assignment of `value` to a variable of the `targets` port.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimelineEvent {
    pub at: f64,
    pub variable: String,
    pub value: Value,
}

/// Keeps `global/time` and replaces target variables when their events fall
/// due. An event at `t` fires in the invocation covering `[t, t + dt)`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
    pub timestep: Option<f64>,
}

impl Process for Timeline {
    fn ports_schema(&self) -> Ports {
        let mut targets = PortSchema::new();
        for event in &self.events {
            let kind = event.value.kind();
            targets = targets.with(
                &event.variable,
                Schema::of_kind(kind, kind.zero())
                    .replace()
                    .divider(DividerKind::Set),
            );
        }
        let mut ports = Ports::new();
        ports.insert("targets".to_string(), targets);
        ports.insert(
            "global".to_string(),
            PortSchema::new().with(
                "time",
                Schema::float(0.0).unit("s").divider(DividerKind::Set),
            ),
        );
        ports
    }

    fn next_update(&self, timestep: f64, view: &StateView) -> anyhow::Result<Step> {
        let time = view.float("global", "time")?;
        let mut update = ProcessUpdate::new().with("global", "time", timestep);
        for event in &self.events {
            if event.at >= time && event.at < time + timestep {
                update.set("targets", &event.variable, event.value.clone());
            }
        }
        Ok(Step::full(update, timestep))
    }

    fn timestep(&self) -> f64 {
        self.timestep.unwrap_or(1.0)
    }
}
