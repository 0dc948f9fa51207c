//! Applying `_add`, `_delete` and `_divide` between rounds.
//!
//! A batch of directives is applied to a staged composite that owns a copy of
//! the store and topology plus only the processes created by the batch. The
//! live composite is touched only after every directive succeeded.

use crate::composite::{Composite, ProcessInstance};
use crate::division;
use crate::engine::update::Staged;
use crate::engine::{Engine, Slot};
use crate::error::{Result, SimError, StructuralError};
use crate::store::Store;
use crate::topology::{ProcessId, Topology};
use biosphere_data::{CompositeSpec, Directive, Path, ProcessDecl};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Changes accumulated while a batch is staged.
struct Batch {
    staged: Composite,
    retired: BTreeSet<ProcessId>,
    removed_paths: Vec<Path>,
    /// Advanced by divisions; replaces the engine RNG only on commit.
    rng: ChaCha8Rng,
    divisions: u64,
    additions: u64,
    deletions: u64,
}

/// A process to re-create under a daughter.
struct Template {
    name: String,
    mount: Path,
    decl: ProcessDecl,
}

impl Engine {
    /// Applies a batch of directives atomically at time `now`. New processes
    /// start with their clock at `now`; retired processes lose any pending
    /// update.
    pub(crate) fn apply_structural(&mut self, directives: Vec<Staged>, now: f64) -> Result<()> {
        let mut batch = Batch {
            staged: Composite {
                store: self.composite.store.clone(),
                processes: BTreeMap::new(),
                topology: self.composite.topology.clone(),
            },
            retired: BTreeSet::new(),
            removed_paths: Vec::new(),
            rng: self.rng.clone(),
            divisions: 0,
            additions: 0,
            deletions: 0,
        };

        for (source, branch, directive) in directives {
            if !batch.staged.store.is_structural(&branch) {
                return Err(StructuralError::NotPermitted {
                    directive: directive.label(),
                    path: branch,
                }
                .into());
            }
            debug!(process = %source, branch = %branch, directive = directive.label(), "structural directive");
            let applied = match directive {
                Directive::Delete { key } => self.delete(&mut batch, &branch.child(&key)),
                Directive::Add { key, composite } => self.add(&mut batch, &branch.child(&key), &composite),
                Directive::Divide { mother, daughters } => {
                    let daughters = daughters.unwrap_or_else(|| division::daughter_keys(&mother));
                    self.divide(&mut batch, &branch, &mother, &daughters)
                }
            };
            applied.map_err(|err| err.with_context(format!("directive from {source}")))?;
        }

        self.check_dangling(&batch)?;
        self.commit(batch, now)
    }

    fn delete(&self, batch: &mut Batch, target: &Path) -> Result<()> {
        batch.staged.store.extract(target)?;
        self.retire_under(batch, target);
        batch.removed_paths.push(target.clone());
        batch.deletions += 1;
        info!(path = %target, "subtree deleted");
        Ok(())
    }

    fn add(&self, batch: &mut Batch, target: &Path, spec: &CompositeSpec) -> Result<()> {
        let occupied = batch.staged.store.contains(target)
            || self.live_under(batch, target).next().is_some()
            || batch
                .staged
                .processes
                .values()
                .any(|instance| instance.mount.starts_with(target));
        if occupied {
            return Err(StructuralError::KeyExists(target.clone()).into());
        }
        batch.staged.store.establish_branch(target)?;
        let installed = batch.staged.mount(spec, target, &self.registry)?;
        batch.additions += 1;
        info!(path = %target, processes = installed.len(), "composite added");
        Ok(())
    }

    fn divide(&mut self, batch: &mut Batch, branch: &Path, mother: &str, daughters: &[String; 2]) -> Result<()> {
        let mother_path = branch.child(mother);
        let targets = [branch.child(&daughters[0]), branch.child(&daughters[1])];
        for target in &targets {
            if batch.staged.store.contains(target) {
                return Err(StructuralError::KeyExists(target.clone()).into());
            }
        }

        let mut templates: Vec<Template> = self
            .live_under(batch, &mother_path)
            .map(|instance| Template {
                name: instance.name.clone(),
                mount: instance.mount.clone(),
                decl: instance.decl.clone(),
            })
            .collect();
        templates.extend(
            batch
                .staged
                .remove_processes_under(&mother_path)
                .into_iter()
                .map(|instance| Template {
                    name: instance.name,
                    mount: instance.mount,
                    decl: instance.decl,
                }),
        );
        self.retire_under(batch, &mother_path);

        let subtree = batch.staged.store.extract(&mother_path)?;
        let halves = division::divide(&mother_path, &subtree, &self.registry, &mut batch.rng)?;
        for (target, half) in targets.iter().zip(halves) {
            batch.staged.store.graft(target, half)?;
        }
        for target in &targets {
            for template in &templates {
                let mount = template
                    .mount
                    .rebase(&mother_path, target)
                    .unwrap_or_else(|| target.clone());
                batch
                    .staged
                    .install_process(&template.name, &mount, &template.decl, &self.registry)?;
            }
        }

        batch.removed_paths.push(mother_path.clone());
        batch.divisions += 1;
        info!(
            mother = %mother_path,
            first = %targets[0],
            second = %targets[1],
            processes = templates.len(),
            "division"
        );
        Ok(())
    }

    /// Live processes mounted at or below `prefix` that the batch has not
    /// retired yet.
    fn live_under<'a>(&'a self, batch: &'a Batch, prefix: &'a Path) -> impl Iterator<Item = &'a ProcessInstance> + 'a {
        self.composite
            .processes
            .values()
            .filter(move |instance| instance.mount.starts_with(prefix) && !batch.retired.contains(&instance.id))
    }

    fn retire_under(&self, batch: &mut Batch, prefix: &Path) {
        let ids: Vec<ProcessId> = self.live_under(batch, prefix).map(|instance| instance.id.clone()).collect();
        for id in ids {
            batch.staged.topology.remove(&id);
            batch.retired.insert(id);
        }
        batch.staged.remove_processes_under(prefix);
    }

    fn check_dangling(&self, batch: &Batch) -> Result<()> {
        for removed in &batch.removed_paths {
            for (process, port, path) in batch.staged.topology.bindings_into(removed) {
                if !batch.staged.store.contains(&path) {
                    return Err(StructuralError::DanglingBinding { process, port, path }.into());
                }
            }
        }
        Ok(())
    }

    /// Swaps the staged state in. Composite validation runs on the result and
    /// a failure restores the previous state.
    fn commit(&mut self, batch: Batch, now: f64) -> Result<()> {
        let Batch {
            staged,
            retired,
            rng,
            divisions,
            additions,
            deletions,
            ..
        } = batch;

        let previous_store: Store = std::mem::replace(&mut self.composite.store, staged.store);
        let previous_topology: Topology = std::mem::replace(&mut self.composite.topology, staged.topology);
        let mut retired_instances = Vec::with_capacity(retired.len());
        for id in &retired {
            if let Some(instance) = self.composite.processes.remove(id) {
                retired_instances.push(instance);
            }
        }
        let added: Vec<ProcessId> = staged.processes.keys().cloned().collect();
        self.composite.processes.extend(staged.processes);

        if let Err(err) = self.composite.validate() {
            for id in &added {
                self.composite.processes.remove(id);
            }
            for instance in retired_instances {
                self.composite.processes.insert(instance.id.clone(), instance);
            }
            self.composite.store = previous_store;
            self.composite.topology = previous_topology;
            return Err(SimError::from(err).with_context("structural change rejected"));
        }

        self.rng = rng;
        for id in &retired {
            self.slots.remove(id);
        }
        for id in added {
            self.slots.insert(
                id,
                Slot {
                    clock: now,
                    pending: None,
                },
            );
        }
        for _ in 0..divisions {
            self.metrics.record_division();
        }
        for _ in 0..additions {
            self.metrics.record_addition();
        }
        for _ in 0..deletions {
            self.metrics.record_deletion();
        }
        debug!(
            retired = retired.len(),
            processes = self.slots.len(),
            time = now,
            "structural batch committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::process::{PortSchema, Ports, Process, ProcessUpdate, StateView, Step};
    use crate::registry::Registry;
    use biosphere_data::{Schema, Value};
    use serde::Deserialize;

    /// Grows `volume` and asks its colony to divide it past `threshold`.
    #[derive(Deserialize)]
    struct Cell {
        threshold: f64,
    }

    impl Process for Cell {
        fn ports_schema(&self) -> Ports {
            let mut ports = Ports::new();
            ports.insert(
                "self".to_string(),
                PortSchema::new().with("volume", Schema::float(1.0).split()),
            );
            ports.insert("colony".to_string(), PortSchema::new().structural());
            ports
        }

        fn next_update(&self, timestep: f64, view: &StateView) -> anyhow::Result<Step> {
            let volume = view.float("self", "volume")?;
            let mut update = ProcessUpdate::new().with("self", "volume", volume * timestep);
            if volume >= self.threshold {
                let key = view
                    .path("self")?
                    .last()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("cell mounted at the root"))?;
                update = update.with_directive("colony", Directive::divide(&key));
            }
            Ok(Step::full(update, timestep))
        }
    }

    /// Deletes the first listed member of its structural port.
    #[derive(Deserialize)]
    struct Reaper {}

    impl Process for Reaper {
        fn ports_schema(&self) -> Ports {
            let mut ports = Ports::new();
            ports.insert("colony".to_string(), PortSchema::new().structural());
            ports
        }

        fn next_update(&self, timestep: f64, view: &StateView) -> anyhow::Result<Step> {
            let mut update = ProcessUpdate::new();
            if let Some(first) = view.children("colony")?.first() {
                update = update.with_directive("colony", Directive::delete(first));
            }
            Ok(Step::full(update, timestep))
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_type::<Cell>("cell").unwrap();
        registry.register_type::<Reaper>("reaper").unwrap();
        registry
    }

    fn cell(threshold: f64) -> CompositeSpec {
        CompositeSpec::new().with_process(
            "grow",
            ProcessDecl::new("cell")
                .with_params(serde_json::json!({ "threshold": threshold }))
                .with_port("self", ".")
                .with_port("colony", ".."),
        )
    }

    fn colony(threshold: f64) -> CompositeSpec {
        CompositeSpec::new()
            .with_structural("colony")
            .with_composite("colony/c", cell(threshold))
    }

    fn volume(engine: &Engine, path: &str) -> f64 {
        engine
            .store()
            .value(&Path::parse(path))
            .and_then(Value::as_f64)
            .unwrap()
    }

    #[test]
    fn test_division_splits_state_and_processes() {
        let mut engine = Engine::from_spec(&colony(1.5), registry(), SimConfig::default()).unwrap();
        // t=1: volume 1 -> 2, no division yet. t=2: volume 2 -> 4 and divide.
        engine.run(2.0).unwrap();

        assert!(!engine.store().contains(&Path::parse("colony/c")));
        assert!((volume(&engine, "colony/c0/volume") - 2.0).abs() < 1e-9);
        assert!((volume(&engine, "colony/c1/volume") - 2.0).abs() < 1e-9);
        assert_eq!(
            engine.process_ids(),
            vec![Path::parse("colony/c0/grow"), Path::parse("colony/c1/grow")]
        );
        assert_eq!(engine.clock(&Path::parse("colony/c0/grow")), Some(2.0));
        assert_eq!(engine.metrics().divisions(), 1);
    }

    #[test]
    fn test_directive_on_plain_branch_is_rejected() {
        let mut engine = Engine::from_spec(&colony(100.0), registry(), SimConfig::default()).unwrap();
        let directives = vec![(Path::parse("driver"), Path::parse("colony/c"), Directive::delete("volume"))];
        let err = engine.apply_structural(directives, 0.0).unwrap_err();
        assert!(matches!(
            err.root(),
            SimError::Structural(StructuralError::NotPermitted { .. })
        ));
        assert!(engine.store().contains(&Path::parse("colony/c/volume")));
    }

    #[test]
    fn test_delete_retires_processes() {
        let spec = colony(100.0)
            .with_composite("colony/d", cell(100.0))
            .with_process("reaper", ProcessDecl::new("reaper").with_timestep(1.5));
        let mut engine = Engine::from_spec(&spec, registry(), SimConfig::default()).unwrap();
        engine.run(1.5).unwrap();

        assert!(!engine.store().contains(&Path::parse("colony/c")));
        assert!(engine.store().contains(&Path::parse("colony/d")));
        assert_eq!(
            engine.process_ids(),
            vec![Path::parse("colony/d/grow"), Path::parse("reaper")]
        );
        assert_eq!(engine.metrics().deletions(), 1);
    }

    #[test]
    fn test_add_mounts_new_composite() {
        let mut engine = Engine::from_spec(&colony(100.0), registry(), SimConfig::default()).unwrap();
        let spawn = cell(100.0).with_state("volume", 3.0);
        let directives = vec![(
            Path::parse("driver"),
            Path::parse("colony"),
            Directive::add("n", spawn.clone()),
        )];
        engine.apply_structural(directives, 0.0).unwrap();
        assert!((volume(&engine, "colony/n/volume") - 3.0).abs() < 1e-9);
        assert_eq!(engine.clock(&Path::parse("colony/n/grow")), Some(0.0));

        let again = vec![(Path::parse("driver"), Path::parse("colony"), Directive::add("n", spawn))];
        let err = engine.apply_structural(again, 0.0).unwrap_err();
        assert!(matches!(
            err.root(),
            SimError::Structural(StructuralError::KeyExists(_))
        ));
        assert_eq!(engine.metrics().additions(), 1);
    }

    #[test]
    fn test_dangling_binding_aborts_the_batch() {
        let spec = colony(100.0).with_process(
            "watcher",
            ProcessDecl::new("cell")
                .with_params(serde_json::json!({ "threshold": 100.0 }))
                .with_port("self", "colony/c")
                .with_port("colony", "colony"),
        );
        let mut engine = Engine::from_spec(&spec, registry(), SimConfig::default()).unwrap();
        let directives = vec![(Path::parse("driver"), Path::parse("colony"), Directive::delete("c"))];
        let err = engine.apply_structural(directives, 0.0).unwrap_err();
        assert!(matches!(
            err.root(),
            SimError::Structural(StructuralError::DanglingBinding { .. })
        ));
        assert!(engine.store().contains(&Path::parse("colony/c/volume")));
        assert_eq!(engine.process_ids().len(), 2);
    }

    #[test]
    fn test_rejected_division_keeps_rng_state() {
        let spec = colony(100.0)
            .with_schema("colony/c/count", Schema::int(7).split())
            .with_process(
                "watcher",
                ProcessDecl::new("cell")
                    .with_params(serde_json::json!({ "threshold": 100.0 }))
                    .with_port("self", "colony/c")
                    .with_port("colony", "colony"),
            );
        let mut engine = Engine::from_spec(&spec, registry(), SimConfig::default()).unwrap();
        let before = engine.rng.clone();

        let divide = vec![(Path::parse("driver"), Path::parse("colony"), Directive::divide("c"))];
        let err = engine.apply_structural(divide, 0.0).unwrap_err();
        assert!(matches!(
            err.root(),
            SimError::Structural(StructuralError::DanglingBinding { .. })
        ));
        assert!(engine.rng == before);

        let mut engine = Engine::from_spec(
            &colony(100.0).with_schema("colony/c/count", Schema::int(7).split()),
            registry(),
            SimConfig::default(),
        )
        .unwrap();
        let before = engine.rng.clone();
        let divide = vec![(Path::parse("driver"), Path::parse("colony"), Directive::divide("c"))];
        engine.apply_structural(divide, 0.0).unwrap();
        assert!(engine.rng != before);
    }

    #[test]
    fn test_missing_divider_fails_division() {
        let spec = colony(0.5).with_schema("colony/c/age", Schema::float(0.0));
        let mut engine = Engine::from_spec(&spec, registry(), SimConfig::default()).unwrap();
        let err = engine.run(1.0).unwrap_err();
        assert!(matches!(
            err.root(),
            SimError::Structural(StructuralError::MissingDivider { .. })
        ));
    }
}
