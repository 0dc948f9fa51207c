//! Core data structures shared by the engine and its drivers.

pub mod declaration;
pub mod path;
pub mod schema;
pub mod state;
pub mod update;
pub mod value;
