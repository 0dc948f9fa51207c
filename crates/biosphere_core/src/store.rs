//! Arena-backed hierarchical state store.
//!
//! Nodes live in a flat `Vec` and refer to each other by index, so the engine
//! can hand out plain-value views, stage a copy for merging and swap it in
//! without any live references into the tree.

use crate::error::{value_error, ConfigError, Result, SimError, StructuralError};
use crate::registry::Registry;
use biosphere_data::{Path, Schema, StateTree, Update, UpdaterKind, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub type NodeId = usize;

/// Who declared a leaf. Stronger declarations decide the updater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Origin {
    Reader,
    Writer,
    Override,
}

#[derive(Debug, Clone)]
struct Leaf {
    schema: Schema,
    value: Option<Value>,
    origin: Origin,
}

impl Leaf {
    /// The stored value, or the schema default unless the leaf is required.
    fn effective(&self) -> Option<&Value> {
        match &self.value {
            Some(value) => Some(value),
            None if self.schema.required => None,
            None => Some(&self.schema.default),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Branch {
    children: BTreeMap<String, NodeId>,
    structural: bool,
}

#[derive(Debug, Clone)]
enum Kind {
    Leaf(Leaf),
    Branch(Branch),
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    kind: Kind,
}

/// A subtree detached from a store, schemas included.
#[derive(Debug, Clone, PartialEq)]
pub enum Subtree {
    Leaf {
        schema: Schema,
        value: Option<Value>,
        origin: Origin,
    },
    Branch {
        children: BTreeMap<String, Subtree>,
        structural: bool,
    },
}

impl Default for Subtree {
    fn default() -> Self {
        Subtree::Branch {
            children: BTreeMap::new(),
            structural: false,
        }
    }
}

impl Subtree {
    /// Number of leaves below this node.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Subtree::Leaf { .. } => 1,
            Subtree::Branch { children, .. } => children.values().map(Subtree::leaf_count).sum(),
        }
    }
}

/// Tracks which writer replaced which path during one merge round.
#[derive(Debug, Default)]
pub(crate) struct RoundLedger {
    round: u64,
    replaced: HashMap<Path, String>,
}

impl RoundLedger {
    pub(crate) fn new(round: u64) -> Self {
        Self {
            round,
            replaced: HashMap::new(),
        }
    }

    fn claim(&mut self, path: &Path, writer: &str) -> Result<()> {
        match self.replaced.get(path) {
            Some(first) if first != writer => Err(SimError::ConflictingWriters {
                path: path.clone(),
                first: first.clone(),
                second: writer.to_string(),
                round: self.round,
            }),
            Some(_) => Ok(()),
            None => {
                self.replaced.insert(path.clone(), writer.to_string());
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    root: NodeId,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatch(path: &Path, expected: &'static str, found: &'static str) -> ConfigError {
    ConfigError::BranchLeafMismatch {
        path: path.clone(),
        expected,
        found,
    }
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node {
                name: String::new(),
                parent: None,
                kind: Kind::Branch(Branch::default()),
            })],
            free: Vec::new(),
            root: 0,
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    fn kind_mut(&mut self, id: NodeId) -> Option<&mut Kind> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .map(|node| &mut node.kind)
    }

    fn children_mut(&mut self, id: NodeId) -> Option<&mut BTreeMap<String, NodeId>> {
        match self.kind_mut(id)? {
            Kind::Branch(branch) => Some(&mut branch.children),
            Kind::Leaf(_) => None,
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id] = Some(node);
            id
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn insert_child(&mut self, parent: NodeId, name: &str, kind: Kind) -> NodeId {
        let id = self.alloc(Node {
            name: name.to_string(),
            parent: Some(parent),
            kind,
        });
        if let Some(children) = self.children_mut(parent) {
            children.insert(name.to_string(), id);
        }
        id
    }

    pub fn lookup(&self, path: &Path) -> Option<NodeId> {
        let mut id = self.root;
        for step in path.steps() {
            match &self.node(id)?.kind {
                Kind::Branch(branch) => id = *branch.children.get(step)?,
                Kind::Leaf(_) => return None,
            }
        }
        Some(id)
    }

    /// Path of a live node, rebuilt from parent links.
    pub fn path_of(&self, id: NodeId) -> Option<Path> {
        let mut steps = Vec::new();
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent {
            steps.push(current.name.clone());
            current = self.node(parent)?;
        }
        steps.reverse();
        Some(Path::new(steps))
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.lookup(path).is_some()
    }

    fn leaf(&self, path: &Path) -> Option<&Leaf> {
        match &self.node(self.lookup(path)?)?.kind {
            Kind::Leaf(leaf) => Some(leaf),
            Kind::Branch(_) => None,
        }
    }

    #[must_use]
    pub fn is_leaf(&self, path: &Path) -> bool {
        self.leaf(path).is_some()
    }

    /// Value at a leaf, falling back to its schema default.
    #[must_use]
    pub fn value(&self, path: &Path) -> Option<&Value> {
        self.leaf(path)?.effective()
    }

    #[must_use]
    pub fn schema(&self, path: &Path) -> Option<&Schema> {
        self.leaf(path).map(|leaf| &leaf.schema)
    }

    #[must_use]
    pub fn is_structural(&self, path: &Path) -> bool {
        self.lookup(path)
            .and_then(|id| self.node(id))
            .is_some_and(|node| matches!(&node.kind, Kind::Branch(b) if b.structural))
    }

    /// Keys of a branch. Empty for leaves and missing paths.
    #[must_use]
    pub fn children(&self, path: &Path) -> Vec<String> {
        match self.lookup(path).and_then(|id| self.node(id)) {
            Some(Node {
                kind: Kind::Branch(branch),
                ..
            }) => branch.children.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Plain copy of the values at or below `path`.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<StateTree> {
        self.tree_of(self.lookup(path)?)
    }

    fn tree_of(&self, id: NodeId) -> Option<StateTree> {
        match &self.node(id)?.kind {
            Kind::Leaf(leaf) => leaf.effective().cloned().map(StateTree::Leaf),
            Kind::Branch(branch) => Some(StateTree::Branch(
                branch
                    .children
                    .iter()
                    .filter_map(|(key, child)| Some((key.clone(), self.tree_of(*child)?)))
                    .collect(),
            )),
        }
    }

    #[must_use]
    pub fn to_state_tree(&self) -> StateTree {
        self.tree_of(self.root).unwrap_or_default()
    }

    /// Reads `path` for a port declaring `declared`. Missing paths yield the
    /// declared default unless it is required.
    pub fn read(&self, path: &Path, declared: &Schema) -> std::result::Result<Value, ConfigError> {
        let missing = || ConfigError::MissingRequired { path: path.clone() };
        match self.lookup(path).and_then(|id| self.node(id)) {
            Some(Node {
                kind: Kind::Leaf(leaf),
                ..
            }) => leaf.effective().cloned().ok_or_else(missing),
            Some(_) => Err(mismatch(path, "leaf", "branch")),
            None if declared.required => Err(missing()),
            None => Ok(declared.default.clone()),
        }
    }

    /// Creates the branches along `path`.
    pub fn establish_branch(&mut self, path: &Path) -> std::result::Result<NodeId, ConfigError> {
        let mut id = self.root;
        for (depth, step) in path.steps().iter().enumerate() {
            let existing = match self.node(id).map(|node| &node.kind) {
                Some(Kind::Branch(branch)) => branch.children.get(step).copied(),
                _ => {
                    let at = Path::new(path.steps()[..depth].iter().cloned());
                    return Err(mismatch(&at, "branch", "leaf"));
                }
            };
            id = match existing {
                Some(child) => child,
                None => self.insert_child(id, step, Kind::Branch(Branch::default())),
            };
        }
        match self.node(id).map(|node| &node.kind) {
            Some(Kind::Branch(_)) => Ok(id),
            _ => Err(mismatch(path, "branch", "leaf")),
        }
    }

    /// Marks a branch as accepting structural directives.
    pub fn mark_structural(&mut self, path: &Path) -> std::result::Result<(), ConfigError> {
        let id = self.establish_branch(path)?;
        if let Some(Kind::Branch(branch)) = self.kind_mut(id) {
            branch.structural = true;
        }
        Ok(())
    }

    /// Creates the leaf at `path` or reconciles `schema` with the one
    /// already there.
    pub fn establish_leaf(
        &mut self,
        path: &Path,
        schema: &Schema,
        origin: Origin,
    ) -> std::result::Result<NodeId, ConfigError> {
        schema
            .validate()
            .map_err(|source| ConfigError::InvalidSchema {
                path: path.clone(),
                source,
            })?;
        let (Some(parent_path), Some(name)) = (path.parent(), path.last()) else {
            return Err(mismatch(path, "leaf", "branch"));
        };
        let parent = self.establish_branch(&parent_path)?;
        let existing = match self.node(parent).map(|node| &node.kind) {
            Some(Kind::Branch(branch)) => branch.children.get(name).copied(),
            _ => None,
        };
        match existing {
            Some(id) => match self.kind_mut(id) {
                Some(Kind::Leaf(leaf)) => {
                    reconcile(path, leaf, schema, origin)?;
                    Ok(id)
                }
                _ => Err(mismatch(path, "leaf", "branch")),
            },
            None => Ok(self.insert_child(
                parent,
                name,
                Kind::Leaf(Leaf {
                    schema: schema.clone(),
                    value: None,
                    origin,
                }),
            )),
        }
    }

    /// Sets a leaf directly, inferring a schema for undeclared paths.
    pub fn set_value(&mut self, path: &Path, value: Value) -> std::result::Result<(), ConfigError> {
        if !self.contains(path) {
            self.establish_leaf(path, &Schema::infer(&value), Origin::Reader)?;
        }
        let id = self.lookup(path).ok_or_else(|| mismatch(path, "leaf", "branch"))?;
        match self.kind_mut(id) {
            Some(Kind::Leaf(leaf)) => {
                if !leaf.schema.kind.accepts(value.kind()) {
                    return Err(ConfigError::InitialState {
                        path: path.clone(),
                        reason: format!("expected {}, got {}", leaf.schema.kind, value.kind()),
                    });
                }
                leaf.value = Some(value.coerce(leaf.schema.kind));
                Ok(())
            }
            _ => Err(mismatch(path, "leaf", "branch")),
        }
    }

    /// Writes a nested state below `at`. Branches landing on map leaves are
    /// folded into map values.
    pub fn apply_state(&mut self, at: &Path, state: &StateTree) -> std::result::Result<(), ConfigError> {
        match state {
            StateTree::Leaf(value) => self.set_value(at, value.clone()),
            StateTree::Branch(_) if self.is_leaf(at) => self.set_value(at, state.clone().into_value()),
            StateTree::Branch(children) if children.is_empty() => {
                self.establish_branch(at).map(|_| ())
            }
            StateTree::Branch(children) => {
                for (key, child) in children {
                    self.apply_state(&at.child(key), child)?;
                }
                Ok(())
            }
        }
    }

    /// Required leaves that were never given a value.
    #[must_use]
    pub fn missing_required(&self) -> Vec<Path> {
        let mut out = Vec::new();
        self.walk_leaves(self.root, Path::root(), &mut |path, leaf| {
            if leaf.schema.required && leaf.value.is_none() {
                out.push(path);
            }
        });
        out
    }

    /// Leaves at or below `under` with their schemas and effective values.
    #[must_use]
    pub fn leaves(&self, under: &Path) -> Vec<(Path, &Schema, &Value)> {
        let mut out = Vec::new();
        if let Some(id) = self.lookup(under) {
            self.walk_leaves(id, under.clone(), &mut |path, leaf| {
                if let Some(value) = leaf.effective() {
                    out.push((path, &leaf.schema, value));
                }
            });
        }
        out
    }

    /// Every leaf value keyed by its path string.
    #[must_use]
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.leaves(&Path::root())
            .into_iter()
            .map(|(path, _, value)| (path.to_string(), value.clone()))
            .collect()
    }

    fn walk_leaves<'a, F>(&'a self, id: NodeId, at: Path, visit: &mut F)
    where
        F: FnMut(Path, &'a Leaf),
    {
        match self.node(id).map(|node| &node.kind) {
            Some(Kind::Leaf(leaf)) => visit(at, leaf),
            Some(Kind::Branch(branch)) => {
                for (key, child) in &branch.children {
                    self.walk_leaves(*child, at.child(key), visit);
                }
            }
            None => {}
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Returns a new store with `update` merged in. `self` is untouched.
    pub fn apply(&self, update: &Update, registry: &Registry) -> Result<Store> {
        let mut next = self.clone();
        next.merge(update, registry, &mut RoundLedger::default(), "apply")?;
        Ok(next)
    }

    /// Folds the values of `update` into the tree in place. Directives are
    /// rejected; the engine applies them in its structural phase.
    pub(crate) fn merge(
        &mut self,
        update: &Update,
        registry: &Registry,
        ledger: &mut RoundLedger,
        writer: &str,
    ) -> Result<()> {
        if let Some((path, directive)) = update.directives().first() {
            return Err(SimError::update(
                path,
                format!("{} outside the structural phase", directive.label()),
            ));
        }
        for (path, delta) in update.values() {
            self.merge_value(&path, delta, registry, ledger, writer)?;
        }
        Ok(())
    }

    fn merge_value(
        &mut self,
        path: &Path,
        delta: &Value,
        registry: &Registry,
        ledger: &mut RoundLedger,
        writer: &str,
    ) -> Result<()> {
        let id = self
            .lookup(path)
            .ok_or_else(|| SimError::update(path, "no such variable"))?;
        let Some(Kind::Leaf(leaf)) = self.kind_mut(id) else {
            return Err(SimError::update(path, "update targets a branch"));
        };
        let current = leaf.effective().unwrap_or(&leaf.schema.default);
        let next = match &leaf.schema.updater {
            UpdaterKind::Replace => {
                ledger.claim(path, writer)?;
                delta.clone()
            }
            UpdaterKind::Accumulate => current.accumulate(delta).map_err(|e| value_error(path, e))?,
            UpdaterKind::Custom(name) => {
                let updater = registry
                    .updater(name)
                    .ok_or_else(|| ConfigError::UnknownUpdater(name.clone()))?;
                updater(current, delta).map_err(|e| SimError::update(path, e.to_string()))?
            }
        };
        if !leaf.schema.kind.accepts(next.kind()) {
            return Err(SimError::update(
                path,
                format!("expected {}, got {}", leaf.schema.kind, next.kind()),
            ));
        }
        leaf.value = Some(next.coerce(leaf.schema.kind));
        Ok(())
    }

    /// Detaches the subtree at `path`, freeing its nodes.
    pub fn extract(&mut self, path: &Path) -> std::result::Result<Subtree, StructuralError> {
        let missing = || StructuralError::MissingSubtree(path.clone());
        let (Some(parent_path), Some(name)) = (path.parent(), path.last()) else {
            return Err(missing());
        };
        let parent = self.lookup(&parent_path).ok_or_else(missing)?;
        let id = self
            .children_mut(parent)
            .and_then(|children| children.remove(name))
            .ok_or_else(missing)?;
        Ok(self.detach(id))
    }

    /// Drops the subtree at `path`.
    pub fn remove(&mut self, path: &Path) -> std::result::Result<(), StructuralError> {
        self.extract(path).map(drop)
    }

    #[must_use]
    pub fn snapshot(&self, time: f64, round: u64) -> crate::snapshot::Snapshot {
        crate::snapshot::Snapshot::capture(self, time, round)
    }

    /// Non-destructive counterpart of [`Store::extract`].
    #[must_use]
    pub fn copy(&self, path: &Path) -> Option<Subtree> {
        self.lookup(path).and_then(|id| self.copy_node(id))
    }

    fn copy_node(&self, id: NodeId) -> Option<Subtree> {
        Some(match &self.node(id)?.kind {
            Kind::Leaf(leaf) => Subtree::Leaf {
                schema: leaf.schema.clone(),
                value: leaf.value.clone(),
                origin: leaf.origin,
            },
            Kind::Branch(branch) => Subtree::Branch {
                children: branch
                    .children
                    .iter()
                    .filter_map(|(key, child)| Some((key.clone(), self.copy_node(*child)?)))
                    .collect(),
                structural: branch.structural,
            },
        })
    }

    fn detach(&mut self, id: NodeId) -> Subtree {
        let Some(node) = self.nodes.get_mut(id).and_then(Option::take) else {
            return Subtree::default();
        };
        self.free.push(id);
        match node.kind {
            Kind::Leaf(leaf) => Subtree::Leaf {
                schema: leaf.schema,
                value: leaf.value,
                origin: leaf.origin,
            },
            Kind::Branch(branch) => Subtree::Branch {
                children: branch
                    .children
                    .into_iter()
                    .map(|(key, child)| (key, self.detach(child)))
                    .collect(),
                structural: branch.structural,
            },
        }
    }

    /// Attaches `subtree` at `path`. The parent must be an existing branch
    /// and `path` itself must be free.
    pub fn graft(&mut self, path: &Path, subtree: Subtree) -> std::result::Result<(), StructuralError> {
        if self.contains(path) {
            return Err(StructuralError::KeyExists(path.clone()));
        }
        let (Some(parent_path), Some(name)) = (path.parent(), path.last()) else {
            return Err(StructuralError::KeyExists(path.clone()));
        };
        let parent = self
            .lookup(&parent_path)
            .filter(|id| matches!(self.node(*id).map(|n| &n.kind), Some(Kind::Branch(_))))
            .ok_or(StructuralError::MissingSubtree(parent_path))?;
        self.attach(parent, name, subtree);
        Ok(())
    }

    fn attach(&mut self, parent: NodeId, name: &str, subtree: Subtree) -> NodeId {
        match subtree {
            Subtree::Leaf {
                schema,
                value,
                origin,
            } => self.insert_child(
                parent,
                name,
                Kind::Leaf(Leaf {
                    schema,
                    value,
                    origin,
                }),
            ),
            Subtree::Branch {
                children,
                structural,
            } => {
                let id = self.insert_child(
                    parent,
                    name,
                    Kind::Branch(Branch {
                        children: BTreeMap::new(),
                        structural,
                    }),
                );
                for (key, child) in children {
                    self.attach(id, &key, child);
                }
                id
            }
        }
    }
}

/// Folds a later declaration of a leaf into the existing schema.
fn reconcile(
    path: &Path,
    leaf: &mut Leaf,
    declared: &Schema,
    origin: Origin,
) -> std::result::Result<(), ConfigError> {
    let current = &mut leaf.schema;
    if !current.kind.is_compatible_with(declared.kind) {
        return Err(ConfigError::KindMismatch {
            path: path.clone(),
            existing: current.kind,
            declared: declared.kind,
        });
    }
    match (&current.unit, &declared.unit) {
        (Some(existing), Some(unit)) if existing != unit => {
            return Err(ConfigError::UnitMismatch {
                path: path.clone(),
                existing: existing.to_string(),
                declared: unit.to_string(),
            });
        }
        (None, Some(unit)) => current.unit = Some(unit.clone()),
        _ => {}
    }

    let overriding = origin == Origin::Override && leaf.origin != Origin::Override;
    if overriding {
        current.updater = declared.updater.clone();
        current.default = declared.default.clone();
        if declared.divider.is_some() {
            current.divider = declared.divider.clone();
        }
    } else {
        if origin == Origin::Writer && current.updater != declared.updater {
            match leaf.origin {
                Origin::Reader => current.updater = declared.updater.clone(),
                Origin::Writer => {
                    return Err(ConfigError::UpdaterMismatch {
                        path: path.clone(),
                        existing: current.updater.to_string(),
                        declared: declared.updater.to_string(),
                    });
                }
                Origin::Override => {
                    debug!(%path, updater = %current.updater, "keeping overridden updater");
                }
            }
        }
        match (&current.divider, &declared.divider) {
            (None, Some(divider)) => current.divider = Some(divider.clone()),
            (Some(existing), Some(divider))
                if existing != divider && leaf.origin != Origin::Override =>
            {
                return Err(ConfigError::DividerMismatch { path: path.clone() });
            }
            _ => {}
        }
        if current.default != declared.default {
            if origin == Origin::Writer && leaf.origin == Origin::Reader {
                current.default = declared.default.clone();
            } else {
                debug!(%path, kept = %current.default, ignored = %declared.default, "conflicting defaults");
            }
        }
    }

    current.emit |= declared.emit;
    current.required |= declared.required;
    for (key, value) in &declared.properties {
        current
            .properties
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    leaf.origin = leaf.origin.max(origin);
    leaf.schema
        .validate()
        .map_err(|source| ConfigError::InvalidSchema {
            path: path.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use biosphere_data::{DividerKind, UpdateNode};

    fn p(text: &str) -> Path {
        Path::parse(text)
    }

    fn delta(path: &str, value: impl Into<Value>) -> Update {
        Update::at(&p(path), Update::Value(value.into()))
    }

    #[test]
    fn test_establish_and_read_defaults() {
        let mut store = Store::new();
        store
            .establish_leaf(&p("cell/volume"), &Schema::float(1.0), Origin::Writer)
            .unwrap();

        assert_eq!(store.value(&p("cell/volume")), Some(&Value::Float(1.0)));
        assert_eq!(
            store.read(&p("cell/mass"), &Schema::float(3.0)).unwrap(),
            Value::Float(3.0)
        );
        assert!(matches!(
            store.read(&p("cell/mass"), &Schema::float(3.0).required()),
            Err(ConfigError::MissingRequired { .. })
        ));
        assert_eq!(store.children(&p("cell")), vec!["volume".to_string()]);
        assert_eq!(store.path_of(store.lookup(&p("cell/volume")).unwrap()), Some(p("cell/volume")));
    }

    #[test]
    fn test_reconcile_rules() {
        let mut store = Store::new();
        let path = p("cell/volume");
        store
            .establish_leaf(&path, &Schema::float(1.0).unit("fL"), Origin::Writer)
            .unwrap();

        // a reader may fill in a divider
        store
            .establish_leaf(&path, &Schema::float(1.0).split(), Origin::Reader)
            .unwrap();
        assert_eq!(store.schema(&path).unwrap().divider, Some(DividerKind::Split));

        // the first writer's default wins over a reader's
        let mass = p("cell/mass");
        store
            .establish_leaf(&mass, &Schema::float(0.0).read_only(), Origin::Reader)
            .unwrap();
        store
            .establish_leaf(&mass, &Schema::float(7.0), Origin::Writer)
            .unwrap();
        store
            .establish_leaf(&mass, &Schema::float(9.0), Origin::Writer)
            .unwrap();
        assert_eq!(store.value(&mass), Some(&Value::Float(7.0)));

        assert!(matches!(
            store.establish_leaf(&path, &Schema::float(1.0).unit("pL"), Origin::Reader),
            Err(ConfigError::UnitMismatch { .. })
        ));
        assert!(matches!(
            store.establish_leaf(&path, &Schema::float(1.0).replace(), Origin::Writer),
            Err(ConfigError::UpdaterMismatch { .. })
        ));
        assert!(matches!(
            store.establish_leaf(&path, &Schema::text("x"), Origin::Reader),
            Err(ConfigError::KindMismatch { .. })
        ));
        assert!(matches!(
            store.establish_leaf(&p("cell"), &Schema::float(0.0), Origin::Reader),
            Err(ConfigError::BranchLeafMismatch { .. })
        ));
    }

    #[test]
    fn test_override_decides_updater() {
        let mut store = Store::new();
        let path = p("env/glucose");
        store
            .establish_leaf(&path, &Schema::float(0.0), Origin::Writer)
            .unwrap();
        store
            .establish_leaf(&path, &Schema::float(5.0).replace(), Origin::Override)
            .unwrap();
        store
            .establish_leaf(&path, &Schema::float(0.0), Origin::Writer)
            .unwrap();
        assert_eq!(store.schema(&path).unwrap().updater, UpdaterKind::Replace);
        assert_eq!(store.value(&path), Some(&Value::Float(5.0)));
    }

    #[test]
    fn test_merge_per_updater() {
        let registry = Registry::new();
        let mut store = Store::new();
        store
            .establish_leaf(&p("a/sum"), &Schema::float(1.0), Origin::Writer)
            .unwrap();
        store
            .establish_leaf(&p("a/flag"), &Schema::boolean(false), Origin::Writer)
            .unwrap();
        store
            .establish_leaf(&p("a/peak"), &Schema::float(0.0).custom("max"), Origin::Writer)
            .unwrap();

        let mut ledger = RoundLedger::new(1);
        store
            .merge(&delta("a/sum", 2i64), &registry, &mut ledger, "x")
            .unwrap();
        store
            .merge(&delta("a/sum", 0.5), &registry, &mut ledger, "y")
            .unwrap();
        store
            .merge(&delta("a/flag", true), &registry, &mut ledger, "x")
            .unwrap();
        store
            .merge(&delta("a/peak", 7.0), &registry, &mut ledger, "x")
            .unwrap();
        store
            .merge(&delta("a/peak", 3.0), &registry, &mut ledger, "y")
            .unwrap();

        assert_eq!(store.value(&p("a/sum")), Some(&Value::Float(3.5)));
        assert_eq!(store.value(&p("a/flag")), Some(&Value::Bool(true)));
        assert_eq!(store.value(&p("a/peak")), Some(&Value::Float(7.0)));

        let err = store
            .merge(&delta("a/flag", false), &registry, &mut ledger, "y")
            .unwrap_err();
        assert!(matches!(err, SimError::ConflictingWriters { round: 1, .. }));

        let err = store
            .merge(&delta("a/flag", 1.0), &registry, &mut RoundLedger::new(2), "x")
            .unwrap_err();
        assert!(matches!(err, SimError::Update { .. }));
    }

    #[test]
    fn test_apply_is_pure() {
        let registry = Registry::new();
        let mut store = Store::new();
        store
            .establish_leaf(&p("x"), &Schema::float(1.0), Origin::Writer)
            .unwrap();

        let next = store.apply(&delta("x", 1.0), &registry).unwrap();
        assert_eq!(store.value(&p("x")), Some(&Value::Float(1.0)));
        assert_eq!(next.value(&p("x")), Some(&Value::Float(2.0)));

        let mut node = UpdateNode::new();
        node.push_directive(&Path::root(), biosphere_data::Directive::delete("x"))
            .unwrap();
        assert!(store.apply(&Update::Node(node), &registry).is_err());
    }

    #[test]
    fn test_extract_and_graft() {
        let mut store = Store::new();
        store.mark_structural(&p("agents")).unwrap();
        store.set_value(&p("agents/0/volume"), Value::Float(4.0)).unwrap();
        store.set_value(&p("agents/0/name"), Value::from("ecoli")).unwrap();
        let before = store.node_count();

        let subtree = store.extract(&p("agents/0")).unwrap();
        assert_eq!(subtree.leaf_count(), 2);
        assert!(!store.contains(&p("agents/0")));
        assert!(store.node_count() < before);

        store.graft(&p("agents/00"), subtree.clone()).unwrap();
        assert_eq!(store.value(&p("agents/00/volume")), Some(&Value::Float(4.0)));
        assert!(matches!(
            store.graft(&p("agents/00"), subtree),
            Err(StructuralError::KeyExists(_))
        ));
        assert!(store.is_structural(&p("agents")));
        assert!(matches!(
            store.extract(&p("agents/7")),
            Err(StructuralError::MissingSubtree(_))
        ));

        store.remove(&p("agents/00")).unwrap();
        let snapshot = store.snapshot(1.0, 3);
        assert!(snapshot.values.is_empty());
        assert_eq!(snapshot.round, 3);
    }

    #[test]
    fn test_apply_state_folds_maps() {
        let mut store = Store::new();
        store
            .establish_leaf(&p("env/fields"), &Schema::map(), Origin::Writer)
            .unwrap();
        let state = StateTree::new()
            .with("env/fields/glc", 1.0)
            .with("env/temperature", 37.0);
        store.apply_state(&Path::root(), &state).unwrap();

        let fields = store.value(&p("env/fields")).unwrap().as_map().unwrap();
        assert_eq!(fields["glc"], Value::Float(1.0));
        assert_eq!(
            store.schema(&p("env/temperature")).unwrap().updater,
            UpdaterKind::Replace
        );
        assert_eq!(store.values().len(), 2);
    }
}
