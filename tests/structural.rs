mod common;

use biosphere_core::process::{PortSchema, Ports, Process, ProcessUpdate, StateView, Step};
use biosphere_core::{Registry, SimError, StopReason, StructuralError};
use biosphere_data::{CompositeSpec, Directive, Path, ProcessDecl, Schema};
use common::{adder, SimBuilder};

/// Mounts a counter composite under `agents/spawned` the first time it runs.
struct Spawner;

impl Process for Spawner {
    fn ports_schema(&self) -> Ports {
        let mut ports = Ports::new();
        ports.insert("agents".to_string(), PortSchema::new().structural());
        ports
    }

    fn next_update(&self, timestep: f64, view: &StateView) -> anyhow::Result<Step> {
        let mut update = ProcessUpdate::new();
        if !view.children("agents")?.iter().any(|key| key == "spawned") {
            let counter = CompositeSpec::new()
                .with_process("count", adder(1.0, 1.0).with_port("target", "."));
            update.directive("agents", Directive::add("spawned", counter));
        }
        Ok(Step::full(update, timestep))
    }
}

/// Deletes `agents/victim` on its second call.
struct Reaper;

impl Process for Reaper {
    fn ports_schema(&self) -> Ports {
        let mut ports = Ports::new();
        ports.insert("agents".to_string(), PortSchema::new().structural());
        ports.insert("clock".to_string(), PortSchema::new().with("ticks", Schema::float(0.0)));
        ports
    }

    fn next_update(&self, timestep: f64, view: &StateView) -> anyhow::Result<Step> {
        let mut update = ProcessUpdate::new().with("clock", "ticks", 1.0);
        let present = view.children("agents")?.iter().any(|key| key == "victim");
        if present && view.float("clock", "ticks")? >= 1.0 {
            update.directive("agents", Directive::delete("victim"));
        }
        Ok(Step::full(update, timestep))
    }
}

fn register(registry: &mut Registry) {
    registry
        .register_process("spawner", |_| Ok(Box::new(Spawner) as Box<dyn Process>))
        .unwrap();
    registry
        .register_process("reaper", |_| Ok(Box::new(Reaper) as Box<dyn Process>))
        .unwrap();
}

fn victim_colony() -> CompositeSpec {
    CompositeSpec::new()
        .with_structural("agents")
        .with_process(
            "reaper",
            ProcessDecl::new("reaper")
                .with_port("agents", "agents")
                .with_port("clock", "reaper"),
        )
        .with_composite(
            "agents/victim",
            CompositeSpec::new().with_process("slow", adder(1.0, 5.0).with_port("target", ".")),
        )
}

#[test]
fn test_added_composite_starts_at_the_current_time() {
    let mut engine = SimBuilder::new()
        .with_registry(register)
        .with_spec(
            CompositeSpec::new()
                .with_structural("agents")
                .with_process("spawner", ProcessDecl::new("spawner").with_port("agents", "agents")),
        )
        .build();

    engine.run(1.0).unwrap();
    assert_eq!(engine.metrics().additions(), 1);
    assert_eq!(engine.clock(&Path::parse("agents/spawned/count")), Some(1.0));
    assert_value_near!(engine, "agents/spawned/value", 0.0);

    engine.run(2.0).unwrap();
    assert_eq!(engine.metrics().additions(), 1);
    assert_value_near!(engine, "agents/spawned/value", 2.0);
}

#[test]
fn test_deleted_processes_drop_pending_updates() {
    let mut engine = SimBuilder::new()
        .with_registry(register)
        .with_spec(victim_colony())
        .build();

    // no horizon, so the slow process is offered its whole timestep
    engine.run_until(|engine| engine.time() >= 1.0 - 1e-9).unwrap();
    let slow = Path::parse("agents/victim/slow");
    assert!(engine.has_pending(&slow));

    let summary = engine.run(9.0).unwrap();
    assert_eq!(summary.reason, StopReason::Horizon);
    assert_absent!(engine, "agents/victim");
    assert!(!engine.has_pending(&slow));
    assert_eq!(engine.clock(&slow), None);
    assert_eq!(engine.process_ids(), vec![Path::parse("reaper")]);
    assert_value_near!(engine, "reaper/ticks", 10.0);
}

#[test]
fn test_delete_under_a_live_binding_is_rejected() {
    let mut engine = SimBuilder::new()
        .with_registry(register)
        .with_spec(victim_colony().with_process(
            "watch",
            ProcessDecl::new("recorder").with_port("source", "agents/victim"),
        ))
        .build();

    let err = engine.run(3.0).unwrap_err();
    assert!(matches!(
        err.root(),
        SimError::Structural(StructuralError::DanglingBinding { .. })
    ));
    assert!(engine.store().contains(&Path::parse("agents/victim/value")));
    assert_eq!(engine.metrics().deletions(), 0);
    assert_eq!(engine.process_ids().len(), 3);
}
