//! Reference process library.
//!
//! Small, self-contained processes used by the bundled composites, the CLI
//! demos and the integration tests. None of them models real kinetics.

pub mod division;
pub mod expression;
pub mod growth;
pub mod timeline;

pub use division::{DivisionTrigger, Lifespan};
pub use expression::Expression;
pub use growth::{Growth, Volume};
pub use timeline::{Timeline, TimelineEvent};

use biosphere_core::{ConfigError, Registry};

/// Type names the reference processes are registered under.
pub const PROCESS_TYPES: [&str; 6] = ["growth", "volume", "divide", "lifespan", "expression", "timeline"];

/// Registers every reference process under its [`PROCESS_TYPES`] name.
pub fn register_all(registry: &mut Registry) -> Result<(), ConfigError> {
    registry.register_type::<Growth>("growth")?;
    registry.register_type::<Volume>("volume")?;
    registry.register_type::<DivisionTrigger>("divide")?;
    registry.register_type::<Lifespan>("lifespan")?;
    registry.register_type::<Expression>("expression")?;
    registry.register_type::<Timeline>("timeline")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all() {
        let mut registry = Registry::new();
        register_all(&mut registry).unwrap();
        for kind in PROCESS_TYPES {
            assert!(registry.has_process(kind), "{kind} missing");
        }
        assert!(matches!(
            register_all(&mut registry),
            Err(ConfigError::DuplicateRegistration { .. })
        ));
    }
}
