//! # Biosphere Data
//!
//! Plain data types for the biosphere simulation engine: paths into the
//! state tree, leaf values and their schemas, nested update trees with
//! structural directives, and the declarative form of a composite.
//!
//! Nothing in this crate runs a simulation; it only describes state.

pub mod data;

pub use data::declaration::{CompositeSpec, ProcessDecl};
pub use data::path::{Path, PathError, PARENT};
pub use data::schema::{Access, DividerKind, Schema, SchemaError, Unit, UpdaterKind};
pub use data::state::StateTree;
pub use data::update::{Directive, Update, UpdateError, UpdateNode};
pub use data::value::{Value, ValueError, ValueKind};
