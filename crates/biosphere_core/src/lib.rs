//! # Biosphere Core
//!
//! The engine of the biosphere multi-scale simulator.
//!
//! This crate owns everything that runs a simulation:
//! - The hierarchical state `Store` and its merge rules
//! - Port binding and the inverse topology used to route updates
//! - The `Process` trait and the `Registry` of process constructors
//! - `Composite` construction and validation
//! - The `Engine` scheduler with multi-rate clocks, derivers and structural change
//! - Division of subtrees into daughters
//! - Emitters, snapshots, metrics and structured logging
//!
//! ## Architecture
//!
//! Processes never touch shared state. Each round the engine hands every due
//! process a read-only view of its ports, collects the port-relative updates,
//! translates them into absolute paths and folds them into the store according
//! to each leaf's schema. Structural directives are applied between rounds on
//! a staged copy so no process observes a half-applied division.
//!
//! ## Example
//!
//! ```
//! use biosphere_core::process::{PortSchema, Ports, Process, ProcessUpdate, StateView, Step};
//! use biosphere_core::{Engine, Registry, SimConfig};
//! use biosphere_data::{CompositeSpec, Path, ProcessDecl, Schema};
//!
//! struct Decay;
//!
//! impl Process for Decay {
//!     fn ports_schema(&self) -> Ports {
//!         let mut ports = Ports::new();
//!         ports.insert("pool".into(), PortSchema::new().with("mass", Schema::float(8.0)));
//!         ports
//!     }
//!
//!     fn next_update(&self, timestep: f64, view: &StateView) -> anyhow::Result<Step> {
//!         let mass = view.float("pool", "mass")?;
//!         Ok(Step::full(ProcessUpdate::new().with("pool", "mass", -0.5 * mass), timestep))
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry.register_process("decay", |_| Ok(Box::new(Decay) as Box<dyn Process>)).unwrap();
//! let spec = CompositeSpec::new().with_process("decay", ProcessDecl::new("decay"));
//!
//! let mut engine = Engine::from_spec(&spec, registry, SimConfig::default()).unwrap();
//! engine.run(3.0).unwrap();
//! assert_eq!(engine.store().value(&Path::parse("pool/mass")).and_then(|v| v.as_f64()), Some(1.0));
//! ```

/// Multi-cell composites: validated construction from declarations
pub mod composite;
/// Simulation settings loaded from TOML
pub mod config;
/// Splitting a mother subtree into daughters
pub mod division;
/// Emission of state at round boundaries
pub mod emitter;
/// The scheduler, merge loop and structural change protocol
pub mod engine;
/// Error taxonomy for configuration, processes and structural change
pub mod error;
/// Performance metrics collection and logging
pub mod metrics;
/// The process contract: ports, views and port-relative updates
pub mod process;
/// Process constructors, custom updaters and custom dividers
pub mod registry;
/// Serializable state snapshots and their digests
pub mod snapshot;
/// The hierarchical state store
pub mod store;
/// Port binding and update routing
pub mod topology;

pub use composite::{Composite, ProcessInstance};
pub use config::SimConfig;
pub use emitter::Emitter;
pub use engine::{Engine, EngineState, RunSummary, StopHandle, StopReason};
pub use error::{ConfigError, Result, SimError, StructuralError};
pub use metrics::{init_logging, Metrics};
pub use process::{Process, ProcessUpdate, StateView, Step};
pub use registry::Registry;
pub use snapshot::Snapshot;
pub use store::Store;
