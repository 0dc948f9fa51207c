use super::declaration::CompositeSpec;
use super::path::Path;
use super::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpdateError {
    #[error("update at {0} is written twice")]
    DuplicateWrite(Path),
    #[error("update at {0} places a value where a subtree is expected")]
    ValueOverNode(Path),
}

/// A structural change attached to a branch of the update tree. Keys are
/// relative to that branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    /// Replace `mother` with two daughters. Without explicit keys the
    /// daughters are named `<mother>0` and `<mother>1`.
    Divide {
        mother: String,
        #[serde(default)]
        daughters: Option<[String; 2]>,
    },
    /// Mount a new composite under `key`.
    Add {
        key: String,
        composite: Box<CompositeSpec>,
    },
    /// Remove the subtree under `key` together with its processes.
    Delete { key: String },
}

impl Directive {
    #[must_use]
    pub fn divide(mother: &str) -> Self {
        Directive::Divide {
            mother: mother.to_string(),
            daughters: None,
        }
    }

    #[must_use]
    pub fn delete(key: &str) -> Self {
        Directive::Delete {
            key: key.to_string(),
        }
    }

    #[must_use]
    pub fn add(key: &str, composite: CompositeSpec) -> Self {
        Directive::Add {
            key: key.to_string(),
            composite: Box::new(composite),
        }
    }

    /// Name of the directive as it appears in logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Directive::Divide { .. } => "_divide",
            Directive::Add { .. } => "_add",
            Directive::Delete { .. } => "_delete",
        }
    }
}

/// A proposed change mirroring the shape of the store: values at leaves,
/// directives on branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Update {
    Node(UpdateNode),
    Value(Value),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateNode {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, Update>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directives: Vec<Directive>,
}

impl Default for Update {
    fn default() -> Self {
        Update::Node(UpdateNode::default())
    }
}

impl UpdateNode {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty() && self.children.values().all(Update::is_empty)
    }

    /// Places a value at `path` below this node.
    pub fn insert_value(&mut self, path: &Path, value: Value) -> Result<(), UpdateError> {
        let Some((last, init)) = path.steps().split_last() else {
            return Err(UpdateError::ValueOverNode(path.clone()));
        };
        let node = self.descend(init, path)?;
        match node.children.get(last) {
            Some(Update::Value(_)) => return Err(UpdateError::DuplicateWrite(path.clone())),
            Some(Update::Node(_)) => return Err(UpdateError::ValueOverNode(path.clone())),
            None => {}
        }
        node.children.insert(last.clone(), Update::Value(value));
        Ok(())
    }

    /// Attaches a directive to the branch at `path` below this node.
    pub fn push_directive(&mut self, path: &Path, directive: Directive) -> Result<(), UpdateError> {
        let node = self.descend(path.steps(), path)?;
        node.directives.push(directive);
        Ok(())
    }

    fn descend(&mut self, steps: &[String], full: &Path) -> Result<&mut UpdateNode, UpdateError> {
        let mut node = self;
        for step in steps {
            let entry = node
                .children
                .entry(step.clone())
                .or_insert_with(|| Update::Node(UpdateNode::default()));
            node = match entry {
                Update::Node(inner) => inner,
                Update::Value(_) => return Err(UpdateError::ValueOverNode(full.clone())),
            };
        }
        Ok(node)
    }
}

impl Update {
    /// Wraps `update` so it applies at `path`.
    #[must_use]
    pub fn at(path: &Path, update: Update) -> Update {
        path.steps().iter().rev().fold(update, |inner, step| {
            let mut node = UpdateNode::default();
            node.children.insert(step.clone(), inner);
            Update::Node(node)
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Update::Value(_) => false,
            Update::Node(node) => node.is_empty(),
        }
    }

    /// Value entries with their paths relative to this update, depth first.
    #[must_use]
    pub fn values(&self) -> Vec<(Path, &Value)> {
        let mut out = Vec::new();
        self.walk(&Path::root(), &mut |path, update| {
            if let Update::Value(value) = update {
                out.push((path.clone(), value));
            }
        });
        out
    }

    /// Directives with the path of the branch they are attached to.
    #[must_use]
    pub fn directives(&self) -> Vec<(Path, &Directive)> {
        let mut out = Vec::new();
        self.walk(&Path::root(), &mut |path, update| {
            if let Update::Node(node) = update {
                out.extend(node.directives.iter().map(|d| (path.clone(), d)));
            }
        });
        out
    }

    fn walk<'a, F>(&'a self, at: &Path, visit: &mut F)
    where
        F: FnMut(&Path, &'a Update),
    {
        visit(at, self);
        if let Update::Node(node) = self {
            for (key, child) in &node.children {
                child.walk(&at.child(key), visit);
            }
        }
    }
}

impl From<UpdateNode> for Update {
    fn from(node: UpdateNode) -> Self {
        Update::Node(node)
    }
}
