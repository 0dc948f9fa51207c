use super::path::Path;
use super::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Nested plain state, used for initial states and read-only copies of
/// subtrees.
///
/// A nested mapping deserializes as a `Branch`; when a branch lands on a
/// map-valued leaf it is folded back into a [`Value::Map`] with
/// [`StateTree::into_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateTree {
    Branch(BTreeMap<String, StateTree>),
    Leaf(Value),
}

impl Default for StateTree {
    fn default() -> Self {
        StateTree::Branch(BTreeMap::new())
    }
}

impl StateTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`StateTree::insert`].
    #[must_use]
    pub fn with(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.insert(&Path::parse(path), value.into());
        self
    }

    /// Places `value` at `path`, creating branches on the way and replacing
    /// leaves that stand in the way.
    pub fn insert(&mut self, path: &Path, value: Value) {
        insert_steps(self, path.steps(), value);
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&StateTree> {
        let mut node = self;
        for step in path.steps() {
            match node {
                StateTree::Branch(children) => node = children.get(step)?,
                StateTree::Leaf(_) => return None,
            }
        }
        Some(node)
    }

    #[must_use]
    pub fn value(&self, path: &Path) -> Option<&Value> {
        match self.get(path)? {
            StateTree::Leaf(value) => Some(value),
            StateTree::Branch(_) => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            StateTree::Branch(children) => children.is_empty(),
            StateTree::Leaf(_) => false,
        }
    }

    /// Folds a branch into a map value.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            StateTree::Leaf(value) => value,
            StateTree::Branch(children) => Value::Map(
                children
                    .into_iter()
                    .map(|(key, child)| (key, child.into_value()))
                    .collect(),
            ),
        }
    }

    /// All leaves with their paths relative to this node, depth first.
    #[must_use]
    pub fn leaves(&self) -> Vec<(Path, &Value)> {
        let mut out = Vec::new();
        self.collect_leaves(Path::root(), &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, at: Path, out: &mut Vec<(Path, &'a Value)>) {
        match self {
            StateTree::Leaf(value) => out.push((at, value)),
            StateTree::Branch(children) => {
                for (key, child) in children {
                    child.collect_leaves(at.child(key), out);
                }
            }
        }
    }
}

fn insert_steps(node: &mut StateTree, steps: &[String], value: Value) {
    match steps.split_first() {
        None => *node = StateTree::Leaf(value),
        Some((head, rest)) => {
            if let StateTree::Leaf(_) = node {
                *node = StateTree::default();
            }
            if let StateTree::Branch(children) = node {
                insert_steps(children.entry(head.clone()).or_default(), rest, value);
            }
        }
    }
}

impl From<Value> for StateTree {
    fn from(value: Value) -> Self {
        StateTree::Leaf(value)
    }
}
