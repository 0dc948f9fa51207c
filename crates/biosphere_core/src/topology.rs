//! Port wiring. Bindings are resolved to absolute paths once, when a process
//! is installed, and never change afterwards.

use crate::error::{shape_error, ConfigError, Result, SimError};
use crate::process::{Ports, ProcessUpdate};
use biosphere_data::{Directive, Path, Update, UpdateNode};
use std::collections::BTreeMap;

/// A process is identified by its mount path plus its name in the composite.
pub type ProcessId = Path;

pub type Bindings = BTreeMap<String, Path>;

/// Resolves a declared wiring relative to `mount`. Ports missing from the
/// wiring bind to `mount/<port>`.
pub fn bind(
    id: &ProcessId,
    mount: &Path,
    ports: &Ports,
    wiring: &BTreeMap<String, Path>,
) -> std::result::Result<Bindings, ConfigError> {
    if let Some(port) = wiring.keys().find(|port| !ports.contains_key(*port)) {
        return Err(ConfigError::UnknownPort {
            process: id.clone(),
            port: port.clone(),
        });
    }
    ports
        .keys()
        .map(|port| -> std::result::Result<(String, Path), ConfigError> {
            let relative = wiring
                .get(port)
                .cloned()
                .unwrap_or_else(|| Path::parse(port));
            Ok((port.clone(), mount.join(&relative).normalize()?))
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    bindings: BTreeMap<ProcessId, Bindings>,
}

impl Topology {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ProcessId, bindings: Bindings) {
        self.bindings.insert(id, bindings);
    }

    #[must_use]
    pub fn resolve(&self, id: &ProcessId, port: &str) -> Option<&Path> {
        self.bindings.get(id)?.get(port)
    }

    #[must_use]
    pub fn bindings(&self, id: &ProcessId) -> Option<&Bindings> {
        self.bindings.get(id)
    }

    pub fn remove(&mut self, id: &ProcessId) -> Option<Bindings> {
        self.bindings.remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Absolute paths a process touches.
    #[must_use]
    pub fn paths_of(&self, id: &ProcessId) -> Vec<&Path> {
        self.bindings
            .get(id)
            .map(|ports| ports.values().collect())
            .unwrap_or_default()
    }

    /// Bindings at or below `removed`, as `(process, port, path)`.
    #[must_use]
    pub fn bindings_into(&self, removed: &Path) -> Vec<(ProcessId, String, Path)> {
        self.bindings
            .iter()
            .flat_map(|(id, ports)| {
                ports
                    .iter()
                    .filter(|(_, path)| path.starts_with(removed))
                    .map(move |(port, path)| (id.clone(), port.clone(), path.clone()))
            })
            .collect()
    }

    /// Translates a port-relative update into an absolute value update plus
    /// the directives it carries, each with the branch it targets.
    pub fn absolute_update(
        &self,
        id: &ProcessId,
        ports: &Ports,
        update: &ProcessUpdate,
    ) -> Result<(Update, Vec<(Path, Directive)>)> {
        let mut node = UpdateNode::new();
        let mut directives = Vec::new();
        for (port, delta) in &update.ports {
            let (Some(schema), Some(base)) = (ports.get(port), self.resolve(id, port)) else {
                return Err(SimError::update(id, format!("update through unknown port {port:?}")));
            };
            for (variable, value) in &delta.values {
                let path = base.join(&Path::parse(variable));
                match schema.variables.get(variable) {
                    Some(declared) if declared.is_writer() => {
                        node.insert_value(&path, value.clone()).map_err(shape_error)?;
                    }
                    Some(_) => return Err(SimError::update(&path, "variable is read-only")),
                    None => return Err(SimError::update(&path, "variable is not declared")),
                }
            }
            if !delta.directives.is_empty() && !schema.structural {
                return Err(SimError::update(
                    base,
                    format!("port {port:?} is not structural"),
                ));
            }
            directives.extend(delta.directives.iter().map(|d| (base.clone(), d.clone())));
        }
        Ok((Update::Node(node), directives))
    }
}
