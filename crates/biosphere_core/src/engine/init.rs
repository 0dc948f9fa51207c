use crate::composite::Composite;
use crate::config::SimConfig;
use crate::emitter::{self, Emitter, ExperimentInfo};
use crate::engine::{Engine, EngineState, Slot, StopHandle};
use crate::error::{ConfigError, Result};
use crate::metrics::Metrics;
use crate::registry::Registry;
use biosphere_data::CompositeSpec;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

impl Engine {
    /// Takes ownership of a built composite. Derivers run once and the
    /// initial state is emitted before this returns.
    pub fn new(composite: Composite, registry: Registry, config: SimConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|err| ConfigError::InvalidSettings(format!("{err:#}")))?;
        composite.validate()?;

        let slots = composite
            .processes
            .keys()
            .map(|id| (id.clone(), Slot::default()))
            .collect();
        let mut engine = Self {
            rng: ChaCha8Rng::seed_from_u64(config.engine.seed),
            emitter: emitter::from_config(&config.emitter),
            metrics: Metrics::new(config.logging.summary_interval),
            info: ExperimentInfo::new("biosphere experiment"),
            composite,
            registry,
            config,
            slots,
            time: 0.0,
            round: 0,
            state: EngineState::Idle,
            stop: StopHandle::default(),
            last_emit: None,
        };
        info!(
            experiment = %engine.info.experiment_id,
            processes = engine.slots.len(),
            "engine initialized"
        );
        engine.run_derivers()?;
        engine.emit();
        Ok(engine)
    }

    /// Builds `spec` at the root and wraps it in an engine.
    pub fn from_spec(spec: &CompositeSpec, registry: Registry, config: SimConfig) -> Result<Self> {
        let composite = Composite::build(spec, &registry)?;
        Self::new(composite, registry, config)
    }

    /// Replaces the emitter chosen by the configuration. Only emissions
    /// after this call reach it.
    #[must_use]
    pub fn with_emitter(mut self, emitter: Box<dyn Emitter>) -> Self {
        self.emitter = emitter;
        self.last_emit = None;
        self.emit();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.info.description = description.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmitterConfig, EmitterKind};
    use crate::emitter::SnapshotEmitter;

    #[test]
    fn test_empty_engine_emits_initial_state() {
        let config = SimConfig {
            emitter: EmitterConfig {
                kind: EmitterKind::Snapshots,
                ..Default::default()
            },
            ..Default::default()
        };
        let engine = Engine::from_spec(&CompositeSpec::new(), Registry::new(), config).unwrap();
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.emitter().snapshots().len(), 1);
        assert_eq!(engine.time(), 0.0);

        let engine = engine
            .with_emitter(Box::<SnapshotEmitter>::default())
            .with_description("empty");
        assert_eq!(engine.emitter().snapshots().len(), 1);
        assert_eq!(engine.info().description, "empty");
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let mut config = SimConfig::default();
        config.engine.stop_time = f64::NAN;
        let err = Engine::from_spec(&CompositeSpec::new(), Registry::new(), config).unwrap_err();
        assert!(err.is_config());
    }
}
