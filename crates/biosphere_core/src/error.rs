//! Error types for the simulation engine.
//!
//! Every failure carries enough context (path, process id, round) for the
//! driver to reproduce it. Nothing is retried or skipped inside the engine.

use biosphere_data::{Path, PathError, SchemaError, UpdateError, ValueError, ValueKind};
use thiserror::Error;

/// Problems found while validating or wiring a composite.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no process type registered under {0:?}")]
    UnknownProcessType(String),

    #[error("{kind:?} is already registered as a {registry}")]
    DuplicateRegistration { registry: &'static str, kind: String },

    #[error("process {0} is declared twice")]
    DuplicateProcess(Path),

    #[error("could not construct process type {kind:?}: {reason}")]
    Construction { kind: String, reason: String },

    #[error(
        "port {port:?} of {process} expects {expected} but {path} holds {found}"
    )]
    IncompatibleBinding {
        process: Path,
        port: String,
        path: Path,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("kind mismatch at {path}: {existing} vs {declared}")]
    KindMismatch {
        path: Path,
        existing: ValueKind,
        declared: ValueKind,
    },

    #[error("unit mismatch at {path}: {existing} vs {declared}")]
    UnitMismatch {
        path: Path,
        existing: String,
        declared: String,
    },

    #[error("updater mismatch at {path}: {existing} vs {declared}")]
    UpdaterMismatch {
        path: Path,
        existing: String,
        declared: String,
    },

    #[error("divider mismatch at {path}")]
    DividerMismatch { path: Path },

    #[error("{path} is a {found} where a {expected} is required")]
    BranchLeafMismatch {
        path: Path,
        expected: &'static str,
        found: &'static str,
    },

    #[error("required value at {path} was never provided")]
    MissingRequired { path: Path },

    #[error("{first} and {second} both replace {path} in the same round")]
    ConflictingReplaceWriters { path: Path, first: Path, second: Path },

    #[error("process {process} has invalid timestep {timestep}")]
    InvalidTimestep { process: Path, timestep: f64 },

    #[error("topology of {process} wires unknown port {port:?}")]
    UnknownPort { process: Path, port: String },

    #[error("no custom updater registered under {0:?}")]
    UnknownUpdater(String),

    #[error("no custom divider registered under {0:?}")]
    UnknownDivider(String),

    #[error("invalid schema at {path}: {source}")]
    InvalidSchema {
        path: Path,
        #[source]
        source: SchemaError,
    },

    #[error("initial state at {path}: {reason}")]
    InitialState { path: Path, reason: String },

    #[error(transparent)]
    UnresolvablePath(#[from] PathError),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Problems raised while applying `_add`, `_delete` or `_divide`.
#[derive(Error, Debug)]
pub enum StructuralError {
    #[error("{directive} is not permitted at {path}")]
    NotPermitted { directive: &'static str, path: Path },

    #[error("division of {mother} needs a divider for {path}")]
    MissingDivider { mother: Path, path: Path },

    #[error("no subtree at {0}")]
    MissingSubtree(Path),

    #[error("{0} already exists")]
    KeyExists(Path),

    #[error("process {process} still binds port {port:?} to removed {path}")]
    DanglingBinding {
        process: Path,
        port: String,
        path: Path,
    },

    #[error("could not divide {path}: {reason}")]
    DivideFailed { path: Path, reason: String },
}

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("process {process} failed in round {round} at t={time}: {source}")]
    Process {
        process: Path,
        round: u64,
        time: f64,
        #[source]
        source: anyhow::Error,
    },

    #[error("structural change failed: {0}")]
    Structural(#[from] StructuralError),

    #[error("invalid update at {path}: {reason}")]
    Update { path: Path, reason: String },

    #[error("{first} and {second} both replaced {path} in round {round}")]
    ConflictingWriters {
        path: Path,
        first: String,
        second: String,
        round: u64,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        source: Box<SimError>,
    },
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    #[must_use]
    pub fn update<S: Into<String>>(path: &Path, reason: S) -> Self {
        Self::Update {
            path: path.clone(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn process(process: &Path, round: u64, time: f64, source: anyhow::Error) -> Self {
        Self::Process {
            process: process.clone(),
            round,
            time,
            source,
        }
    }

    /// Wraps an error with additional context.
    #[must_use]
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strips `Context` layers.
    #[must_use]
    pub fn root(&self) -> &SimError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self.root(), Self::Config(_))
    }

    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self.root(), Self::Structural(_))
    }
}

impl From<PathError> for SimError {
    fn from(err: PathError) -> Self {
        Self::Config(ConfigError::UnresolvablePath(err))
    }
}

pub(crate) fn value_error(path: &Path, err: ValueError) -> SimError {
    SimError::update(path, err.to_string())
}

pub(crate) fn shape_error(err: UpdateError) -> SimError {
    match &err {
        UpdateError::DuplicateWrite(path) | UpdateError::ValueOverNode(path) => {
            SimError::update(path, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::update(&Path::parse("cell/volume"), "not a number");
        assert_eq!(
            err.to_string(),
            "invalid update at cell/volume: not a number"
        );
    }

    #[test]
    fn test_error_context() {
        let err = SimError::from(StructuralError::MissingSubtree(Path::parse("agents/7")))
            .with_context("round 3");
        assert!(err.to_string().contains("round 3"));
        assert!(err.is_structural());
        assert!(!err.is_config());
    }

    #[test]
    fn test_process_error_carries_identity() {
        let err = SimError::process(
            &Path::parse("agents/0/growth"),
            4,
            2.5,
            anyhow::anyhow!("solver diverged"),
        );
        let text = err.to_string();
        assert!(text.contains("agents/0/growth"));
        assert!(text.contains("round 4"));
        assert!(text.contains("solver diverged"));
    }
}
