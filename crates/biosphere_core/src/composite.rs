//! Validated construction of a composite from its declaration.
//!
//! Installing a declaration happens in a fixed order: schema overrides,
//! structural branches, processes (constructed, bound, their port leaves
//! established), nested composites, then the initial state. The same path is
//! used when the engine mounts a composite at runtime or re-creates the
//! processes of a daughter after division.

use crate::error::ConfigError;
use crate::process::{PortState, Ports, Process, StateView};
use crate::registry::Registry;
use crate::store::{Origin, Store};
use crate::topology::{self, ProcessId, Topology};
use biosphere_data::{CompositeSpec, Path, ProcessDecl, UpdaterKind};
use std::collections::BTreeMap;
use std::fmt;

type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A constructed process together with what the engine needs to schedule
/// and, after division, rebuild it.
pub struct ProcessInstance {
    pub id: ProcessId,
    pub name: String,
    pub mount: Path,
    pub decl: ProcessDecl,
    pub process: Box<dyn Process>,
    pub timestep: f64,
    pub deriver: bool,
    pub ports: Ports,
}

impl fmt::Debug for ProcessInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessInstance")
            .field("id", &self.id)
            .field("kind", &self.decl.kind)
            .field("timestep", &self.timestep)
            .field("deriver", &self.deriver)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct Composite {
    pub store: Store,
    pub processes: BTreeMap<ProcessId, ProcessInstance>,
    pub topology: Topology,
}

impl Composite {
    /// Builds and validates `spec` mounted at the root.
    pub fn build(spec: &CompositeSpec, registry: &Registry) -> ConfigResult<Self> {
        Self::build_at(spec, &Path::root(), registry)
    }

    pub fn build_at(spec: &CompositeSpec, mount: &Path, registry: &Registry) -> ConfigResult<Self> {
        let mut composite = Self::default();
        composite.mount(spec, mount, registry)?;
        composite.validate()?;
        Ok(composite)
    }

    /// Installs `spec` at `mount` and returns the ids of the new processes.
    pub fn mount(
        &mut self,
        spec: &CompositeSpec,
        mount: &Path,
        registry: &Registry,
    ) -> ConfigResult<Vec<ProcessId>> {
        for (relative, schema) in &spec.schema {
            registry.check_schema(schema)?;
            let path = mount.join(relative).normalize()?;
            self.store.establish_leaf(&path, schema, Origin::Override)?;
        }
        for relative in &spec.structural {
            self.store.mark_structural(&mount.join(relative).normalize()?)?;
        }

        let mut installed = Vec::with_capacity(spec.process_count());
        for (name, decl) in &spec.processes {
            installed.push(self.install_process(name, mount, decl, registry)?);
        }
        for (relative, nested) in &spec.composites {
            let at = mount.join(relative).normalize()?;
            installed.extend(self.mount(nested, &at, registry)?);
        }

        self.store.apply_state(mount, &spec.initial_state)?;
        Ok(installed)
    }

    /// Constructs one process, binds its ports and establishes every leaf
    /// they declare.
    pub fn install_process(
        &mut self,
        name: &str,
        mount: &Path,
        decl: &ProcessDecl,
        registry: &Registry,
    ) -> ConfigResult<ProcessId> {
        let id = mount.child(name);
        if self.processes.contains_key(&id) {
            return Err(ConfigError::DuplicateProcess(id));
        }
        let process = registry.construct(&decl.kind, &decl.params)?;
        let deriver = process.is_deriver();
        let timestep = decl.timestep.unwrap_or_else(|| process.timestep());
        if !deriver && !(timestep > 0.0 && timestep.is_finite()) {
            return Err(ConfigError::InvalidTimestep {
                process: id,
                timestep,
            });
        }

        let ports = process.ports_schema();
        let bindings = topology::bind(&id, mount, &ports, &decl.topology)?;
        for (port, schema) in &ports {
            let Some(base) = bindings.get(port) else {
                continue;
            };
            if schema.structural {
                self.store.mark_structural(base)?;
            } else if schema.variables.is_empty() {
                self.store.establish_branch(base)?;
            }
            for (variable, declared) in &schema.variables {
                registry.check_schema(declared)?;
                let path = base.join(&Path::parse(variable));
                if let Some(existing) = self.store.schema(&path) {
                    if !existing.kind.is_compatible_with(declared.kind) {
                        return Err(ConfigError::IncompatibleBinding {
                            process: id,
                            port: port.clone(),
                            path,
                            expected: declared.kind,
                            found: existing.kind,
                        });
                    }
                }
                let origin = if declared.is_writer() {
                    Origin::Writer
                } else {
                    Origin::Reader
                };
                self.store.establish_leaf(&path, declared, origin)?;
            }
        }

        self.topology.insert(id.clone(), bindings);
        self.processes.insert(
            id.clone(),
            ProcessInstance {
                id: id.clone(),
                name: name.to_string(),
                mount: mount.clone(),
                decl: decl.clone(),
                process,
                timestep,
                deriver,
                ports,
            },
        );
        Ok(id)
    }

    /// Checks the whole composite: required values are present and no leaf
    /// has two clock-scheduled replace writers.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(path) = self.store.missing_required().into_iter().next() {
            return Err(ConfigError::MissingRequired { path });
        }
        let mut writers: BTreeMap<Path, &ProcessId> = BTreeMap::new();
        for instance in self.processes.values().filter(|p| !p.deriver) {
            for (path, _) in self.written_paths(instance) {
                let replaced = self
                    .store
                    .schema(&path)
                    .is_some_and(|schema| schema.updater == UpdaterKind::Replace);
                if !replaced {
                    continue;
                }
                if let Some(first) = writers.get(&path) {
                    if **first != instance.id {
                        return Err(ConfigError::ConflictingReplaceWriters {
                            path,
                            first: (*first).clone(),
                            second: instance.id.clone(),
                        });
                    }
                    continue;
                }
                writers.insert(path, &instance.id);
            }
        }
        Ok(())
    }

    /// Absolute paths of the variables a process may write, with their port.
    fn written_paths(&self, instance: &ProcessInstance) -> Vec<(Path, String)> {
        let mut out = Vec::new();
        for (port, schema) in &instance.ports {
            let Some(base) = self.topology.resolve(&instance.id, port) else {
                continue;
            };
            for (variable, declared) in &schema.variables {
                if declared.is_writer() {
                    out.push((base.join(&Path::parse(variable)), port.clone()));
                }
            }
        }
        out
    }

    /// Read-only copy of the state at a process's ports.
    pub fn view(&self, instance: &ProcessInstance) -> ConfigResult<StateView> {
        let mut view = StateView::new();
        for (port, schema) in &instance.ports {
            let Some(base) = self.topology.resolve(&instance.id, port) else {
                continue;
            };
            let mut values = BTreeMap::new();
            for (variable, declared) in &schema.variables {
                let path = base.join(&Path::parse(variable));
                values.insert(variable.clone(), self.store.read(&path, declared)?);
            }
            let children = if schema.structural {
                self.store.children(base)
            } else {
                Vec::new()
            };
            view.insert(
                port,
                PortState {
                    path: base.clone(),
                    values,
                    children,
                },
            );
        }
        Ok(view)
    }

    /// Removes every process mounted at or below `prefix`.
    pub fn remove_processes_under(&mut self, prefix: &Path) -> Vec<ProcessInstance> {
        let ids: Vec<ProcessId> = self
            .processes
            .values()
            .filter(|instance| instance.mount.starts_with(prefix))
            .map(|instance| instance.id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| {
                self.topology.remove(id);
                self.processes.remove(id)
            })
            .collect()
    }

    #[must_use]
    pub fn process_ids(&self) -> Vec<&ProcessId> {
        self.processes.keys().collect()
    }

    #[must_use]
    pub fn process(&self, id: &ProcessId) -> Option<&ProcessInstance> {
        self.processes.get(id)
    }
}
