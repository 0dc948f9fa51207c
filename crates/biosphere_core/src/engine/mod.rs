//! The experiment runner.
//!
//! `Engine` owns the store, the process clocks and the pending updates. Each
//! round moves through `Select → Run → Merge → Structural` and ends with the
//! derivers and emission; the global time only moves once a round is fully
//! applied.

use crate::composite::Composite;
use crate::config::SimConfig;
use crate::emitter::{Emitter, ExperimentInfo};
use crate::metrics::Metrics;
use crate::registry::Registry;
use crate::snapshot::Snapshot;
use crate::store::Store;
use crate::topology::ProcessId;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod init;
pub(crate) mod schedule;
pub mod structural;
pub mod update;

use schedule::Pending;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    Select,
    Run,
    Merge,
    Structural,
    Terminated,
}

/// Why a call to `run` or `run_until` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The requested simulated time was reached.
    Horizon,
    /// The caller's condition held.
    Condition,
    /// `stop()` was called.
    Stopped,
    /// No process is left to schedule.
    Exhausted,
    /// `max_rounds` was hit.
    RoundLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub rounds: u64,
    pub start_time: f64,
    pub end_time: f64,
    pub reason: StopReason,
}

/// Cloneable stop flag, checked between rounds.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Scheduling state of one process.
#[derive(Debug, Clone, Default)]
pub(crate) struct Slot {
    pub clock: f64,
    pub pending: Option<Pending>,
}

pub struct Engine {
    pub(crate) composite: Composite,
    pub(crate) registry: Registry,
    pub(crate) config: SimConfig,
    pub(crate) slots: BTreeMap<ProcessId, Slot>,
    pub(crate) time: f64,
    pub(crate) round: u64,
    pub(crate) state: EngineState,
    pub(crate) stop: StopHandle,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) emitter: Box<dyn Emitter>,
    pub(crate) last_emit: Option<f64>,
    pub(crate) metrics: Metrics,
    pub(crate) info: ExperimentInfo,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("time", &self.time)
            .field("round", &self.round)
            .field("state", &self.state)
            .field("processes", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[must_use]
    pub fn round(&self) -> u64 {
        self.round
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.composite.store
    }

    #[must_use]
    pub fn composite(&self) -> &Composite {
        &self.composite
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.composite.store, self.time, self.round)
    }

    /// Local clock of a process.
    #[must_use]
    pub fn clock(&self, id: &ProcessId) -> Option<f64> {
        self.slots.get(id).map(|slot| slot.clock)
    }

    /// Whether a process has an update computed but not yet merged.
    #[must_use]
    pub fn has_pending(&self, id: &ProcessId) -> bool {
        self.slots.get(id).is_some_and(|slot| slot.pending.is_some())
    }

    #[must_use]
    pub fn process_ids(&self) -> Vec<ProcessId> {
        self.slots.keys().cloned().collect()
    }

    #[must_use]
    pub fn emitter(&self) -> &dyn Emitter {
        self.emitter.as_ref()
    }

    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    #[must_use]
    pub fn info(&self) -> &ExperimentInfo {
        &self.info
    }

    /// Requests termination at the next round boundary.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// A handle another thread can use to stop the run.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}
