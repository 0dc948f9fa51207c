//! Run configuration for the engine.
//!
//! Values come from (in order of precedence) the `Default` impls and a TOML
//! file. Every section is optional.
//!
//! ## Example `biosphere.toml`
//!
//! ```toml
//! [engine]
//! stop_time = 60.0
//! merge_order = "shuffled"
//! seed = 7
//!
//! [emitter]
//! kind = "timeseries"
//! emit_step = 1.0
//!
//! [logging]
//! level = "debug"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Order in which the pending updates of one round are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeOrder {
    /// By process id.
    #[default]
    Sorted,
    /// Reshuffled every round from the seeded RNG. Surfaces custom updaters
    /// that depend on merge order.
    Shuffled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default horizon for `run` when the driver passes none.
    pub stop_time: f64,
    /// Run independent processes of a round on the rayon pool.
    pub parallel: bool,
    pub merge_order: MergeOrder,
    /// Seeds division remainders and shuffled merge order.
    pub seed: u64,
    /// Hard limit on rounds per `run` call. Zero disables it.
    pub max_rounds: u64,
    /// Two times closer than this are the same time.
    pub time_epsilon: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stop_time: 10.0,
            parallel: true,
            merge_order: MergeOrder::Sorted,
            seed: 0,
            max_rounds: 1_000_000,
            time_epsilon: 1e-9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmitterKind {
    Null,
    #[default]
    Timeseries,
    Snapshots,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    pub kind: EmitterKind,
    /// Minimum simulated time between two emissions. Zero emits every round.
    pub emit_step: f64,
    /// Emit every leaf, not only those whose schema sets `emit`.
    pub emit_all: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            kind: EmitterKind::Timeseries,
            emit_step: 0.0,
            emit_all: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Rounds between metric summaries in the log.
    pub summary_interval: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            summary_interval: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub engine: EngineConfig,
    pub emitter: EmitterConfig,
    pub logging: LoggingConfig,
}

impl SimConfig {
    /// Validates all configuration parameters.
    ///
    /// Returns `Ok(())` if every parameter is usable, or `Err` describing the
    /// first failure.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.engine.stop_time >= 0.0 && self.engine.stop_time.is_finite(),
            "Stop time must be finite and non-negative"
        );
        anyhow::ensure!(
            self.engine.time_epsilon >= 0.0 && self.engine.time_epsilon < 1e-3,
            "Time epsilon must be in [0, 1e-3)"
        );
        anyhow::ensure!(
            self.emitter.emit_step >= 0.0,
            "Emit step must be non-negative"
        );
        anyhow::ensure!(
            matches!(
                self.logging.level.to_ascii_lowercase().as_str(),
                "trace" | "debug" | "info" | "warn" | "error"
            ),
            "Unknown log level {:?}",
            self.logging.level
        );
        anyhow::ensure!(
            self.logging.summary_interval > 0,
            "Summary interval must be positive"
        );
        Ok(())
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config = toml::from_str::<Self>(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}
