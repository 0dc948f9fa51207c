//! # Biosphere
//!
//! Reference processes and composites for the biosphere simulation engine,
//! and the helpers the `biosphere` binary uses to run them.
//!
//! The engine itself lives in [`biosphere_core`]; the plain data model in
//! [`biosphere_data`].

/// Declarations of the bundled composites
pub mod composites;
/// Reference process implementations
pub mod processes;

use anyhow::{bail, Context, Result};
use biosphere_core::Registry;
use biosphere_data::CompositeSpec;
use std::path::Path;

/// Demo experiments the binary can run without a composite file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Demo {
    /// A small colony that grows and divides.
    GrowthDivision,
    /// One compartment with three process clocks and a timed inducer.
    Timescales,
}

impl Demo {
    #[must_use]
    pub fn composite(self) -> CompositeSpec {
        match self {
            Demo::GrowthDivision => composites::colony(2, &composites::CellOptions::default()),
            Demo::Timescales => composites::timescales(5.0),
        }
    }
}

/// A registry holding the built-in updaters and every reference process.
pub fn registry() -> Result<Registry> {
    let mut registry = Registry::new();
    processes::register_all(&mut registry)?;
    Ok(registry)
}

/// Loads a composite declaration from a TOML or JSON file.
pub fn load_composite<P: AsRef<Path>>(path: P) -> Result<CompositeSpec> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read composite file: {}", path.display()))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("Failed to parse composite TOML: {}", path.display())),
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse composite JSON: {}", path.display())),
        other => bail!("unsupported composite format {other:?} for {}", path.display()),
    }
}
