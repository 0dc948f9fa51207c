//! Round-boundary output. Emitters only collect in memory; writing results
//! anywhere is up to the driver.

use crate::config::{EmitterConfig, EmitterKind};
use crate::snapshot::Snapshot;
use crate::store::Store;
use biosphere_data::{Path, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-path `(time, value)` series.
pub type Timeseries = BTreeMap<String, Vec<(f64, Value)>>;

pub trait Emitter: Send {
    fn emit(&mut self, store: &Store, time: f64, round: u64);

    fn timeseries(&self) -> Option<&Timeseries> {
        None
    }

    fn snapshots(&self) -> &[Snapshot] {
        &[]
    }
}

#[derive(Debug, Default)]
pub struct NullEmitter;

impl Emitter for NullEmitter {
    fn emit(&mut self, _store: &Store, _time: f64, _round: u64) {}
}

/// Records leaves whose schema sets `emit`, or every leaf with `emit_all`.
#[derive(Debug, Default)]
pub struct TimeseriesEmitter {
    emit_all: bool,
    series: Timeseries,
}

impl TimeseriesEmitter {
    #[must_use]
    pub fn new(emit_all: bool) -> Self {
        Self {
            emit_all,
            series: Timeseries::new(),
        }
    }
}

impl Emitter for TimeseriesEmitter {
    fn emit(&mut self, store: &Store, time: f64, _round: u64) {
        for (path, schema, value) in store.leaves(&Path::root()) {
            if self.emit_all || schema.emit {
                self.series
                    .entry(path.to_string())
                    .or_default()
                    .push((time, value.clone()));
            }
        }
    }

    fn timeseries(&self) -> Option<&Timeseries> {
        Some(&self.series)
    }
}

/// Keeps a full snapshot per emission.
#[derive(Debug, Default)]
pub struct SnapshotEmitter {
    snapshots: Vec<Snapshot>,
}

impl Emitter for SnapshotEmitter {
    fn emit(&mut self, store: &Store, time: f64, round: u64) {
        self.snapshots.push(Snapshot::capture(store, time, round));
    }

    fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }
}

#[must_use]
pub fn from_config(config: &EmitterConfig) -> Box<dyn Emitter> {
    match config.kind {
        EmitterKind::Null => Box::new(NullEmitter),
        EmitterKind::Timeseries => Box::new(TimeseriesEmitter::new(config.emit_all)),
        EmitterKind::Snapshots => Box::<SnapshotEmitter>::default(),
    }
}

/// Identity of one experiment run.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ExperimentInfo {
    pub experiment_id: Uuid,
    pub created: DateTime<Utc>,
    pub description: String,
}

impl ExperimentInfo {
    #[must_use]
    pub fn new(description: &str) -> Self {
        Self {
            experiment_id: Uuid::new_v4(),
            created: Utc::now(),
            description: description.to_string(),
        }
    }
}
