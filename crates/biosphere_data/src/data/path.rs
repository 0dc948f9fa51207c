use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Path step that climbs to the parent node.
pub const PARENT: &str = "..";

/// Step that refers to the current node. Dropped on parse.
pub const CURRENT: &str = ".";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path {0} climbs above the root")]
    AboveRoot(String),
}

/// Address of a node in the state tree, as a sequence of child names.
///
/// Topology paths may contain `..` steps; they are resolved against a mount
/// point with [`Path::normalize`] before touching a store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "PathRepr", into = "String")]
pub struct Path {
    steps: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PathRepr {
    Text(String),
    Steps(Vec<String>),
}

impl From<PathRepr> for Path {
    fn from(repr: PathRepr) -> Self {
        match repr {
            PathRepr::Text(text) => Path::parse(&text),
            PathRepr::Steps(steps) => Path::new(steps),
        }
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

impl From<&str> for Path {
    fn from(text: &str) -> Self {
        Path::parse(text)
    }
}

impl Path {
    /// The root path (no steps).
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: steps
                .into_iter()
                .map(Into::into)
                .filter(|s| !s.is_empty() && s != CURRENT)
                .collect(),
        }
    }

    /// Parses `a/b/c`. The empty string and `.` are the root.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self::new(text.split('/'))
    }

    #[must_use]
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.steps.last().map(String::as_str)
    }

    #[must_use]
    pub fn parent(&self) -> Option<Path> {
        if self.steps.is_empty() {
            return None;
        }
        Some(Self {
            steps: self.steps[..self.steps.len() - 1].to_vec(),
        })
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Path {
        let mut steps = self.steps.clone();
        steps.push(name.to_string());
        Self { steps }
    }

    /// Concatenates two paths without resolving `..` steps.
    #[must_use]
    pub fn join(&self, other: &Path) -> Path {
        let mut steps = self.steps.clone();
        steps.extend(other.steps.iter().cloned());
        Self { steps }
    }

    /// Resolves `..` steps.
    pub fn normalize(&self) -> Result<Path, PathError> {
        let mut resolved: Vec<String> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            if step == PARENT {
                if resolved.pop().is_none() {
                    return Err(PathError::AboveRoot(self.to_string()));
                }
            } else {
                resolved.push(step.clone());
            }
        }
        Ok(Self { steps: resolved })
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.steps.starts_with(&prefix.steps)
    }

    #[must_use]
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        self.steps.strip_prefix(prefix.steps.as_slice()).map(|rest| Self {
            steps: rest.to_vec(),
        })
    }

    /// True when one path is an ancestor of (or equal to) the other.
    #[must_use]
    pub fn overlaps(&self, other: &Path) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// Moves a path that lives under `from` so it lives under `to` instead.
    #[must_use]
    pub fn rebase(&self, from: &Path, to: &Path) -> Option<Path> {
        self.strip_prefix(from).map(|rest| to.join(&rest))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, ".");
        }
        write!(f, "{}", self.steps.join("/"))
    }
}
