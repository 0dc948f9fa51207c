use crate::config::MergeOrder;
use crate::engine::schedule::{self, Job, Pending, RoundContext};
use crate::engine::{Engine, EngineState, RunSummary, StopReason};
use crate::error::Result;
use crate::store::RoundLedger;
use crate::topology::ProcessId;
use biosphere_data::{Directive, Path};
use rand::seq::SliceRandom;
use std::time::Instant;
use tracing::{debug, info, trace};

/// A structural directive together with the process that emitted it and the
/// branch it is attached to.
pub(crate) type Staged = (ProcessId, Path, Directive);

impl Engine {
    /// Advances the simulation by `total_time` of simulated time.
    pub fn run(&mut self, total_time: f64) -> Result<RunSummary> {
        let end = self.time + total_time.max(0.0);
        self.advance(end, &mut |_: &Engine| false)
    }

    /// Runs until `condition` holds at a round boundary, the engine is
    /// stopped or nothing is left to schedule. `max_rounds` bounds the run.
    pub fn run_until<F>(&mut self, mut condition: F) -> Result<RunSummary>
    where
        F: FnMut(&Engine) -> bool,
    {
        self.advance(f64::INFINITY, &mut condition)
    }

    fn advance(&mut self, end: f64, condition: &mut dyn FnMut(&Engine) -> bool) -> Result<RunSummary> {
        let start_time = self.time;
        let start_round = self.round;
        let epsilon = self.config.engine.time_epsilon;
        let max_rounds = self.config.engine.max_rounds;
        info!(start = start_time, end, "run started");

        let reason = loop {
            if self.stop.is_stopped() {
                self.stop.reset();
                break StopReason::Stopped;
            }
            if condition(self) {
                break StopReason::Condition;
            }
            if self.time >= end - epsilon {
                break StopReason::Horizon;
            }
            if max_rounds > 0 && self.round - start_round >= max_rounds {
                break StopReason::RoundLimit;
            }
            if !self.step(end)? {
                break StopReason::Exhausted;
            }
        };

        self.state = if reason == StopReason::Horizon || reason == StopReason::Condition {
            EngineState::Idle
        } else {
            EngineState::Terminated
        };
        let summary = RunSummary {
            rounds: self.round - start_round,
            start_time,
            end_time: self.time,
            reason,
        };
        info!(
            rounds = summary.rounds,
            time = summary.end_time,
            reason = ?summary.reason,
            "run finished"
        );
        Ok(summary)
    }

    /// Executes one round. Returns `false` when no process can make progress.
    pub(crate) fn step(&mut self, end: f64) -> Result<bool> {
        let started = Instant::now();
        let epsilon = self.config.engine.time_epsilon;

        self.state = EngineState::Select;
        let due = self.select_due(end);
        trace!(round = self.round + 1, due = due.len(), "selected");

        self.state = EngineState::Run;
        if !due.is_empty() {
            self.run_processes(&due, end)?;
        }

        let Some(now) = self
            .slots
            .values()
            .filter_map(|slot| slot.pending.as_ref().map(|p| p.completes))
            .min_by(f64::total_cmp)
        else {
            return Ok(false);
        };
        let now = now.max(self.time);

        self.state = EngineState::Merge;
        let round = self.round + 1;
        let mut ready: Vec<ProcessId> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.pending.as_ref().is_some_and(|p| p.completes <= now + epsilon))
            .map(|(id, _)| id.clone())
            .collect();
        if self.config.engine.merge_order == MergeOrder::Shuffled {
            ready.shuffle(&mut self.rng);
            self.metrics.increment_counter("merge.shuffled");
        }
        let directives = self.merge_ready(&ready, round)?;

        self.state = EngineState::Structural;
        if !directives.is_empty() {
            self.apply_structural(directives, now)?;
        }

        self.time = now;
        self.round = round;
        self.run_derivers()?;
        self.emit();
        self.metrics
            .record_round(started.elapsed(), self.time, due.len(), self.slots.len());
        debug!(round, time = now, merged = ready.len(), "round complete");
        Ok(true)
    }

    /// Clock-scheduled processes with no pending update whose clock has
    /// caught up with the global time.
    fn select_due(&self, end: f64) -> Vec<ProcessId> {
        let epsilon = self.config.engine.time_epsilon;
        self.slots
            .iter()
            .filter(|(id, slot)| {
                slot.pending.is_none()
                    && slot.clock <= self.time + epsilon
                    && slot.clock < end - epsilon
                    && self
                        .composite
                        .process(id)
                        .is_some_and(|instance| !instance.deriver)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn run_processes(&mut self, due: &[ProcessId], end: f64) -> Result<()> {
        let composite = &self.composite;
        let mut jobs = Vec::with_capacity(due.len());
        for id in due {
            let (Some(instance), Some(slot)) = (composite.process(id), self.slots.get(id)) else {
                continue;
            };
            jobs.push(Job {
                instance,
                view: composite.view(instance)?,
                clock: slot.clock,
                offered: instance.timestep.min(end - slot.clock),
            });
        }
        let ctx = RoundContext {
            topology: &composite.topology,
            round: self.round + 1,
            time: self.time,
            epsilon: self.config.engine.time_epsilon,
        };
        let pending = schedule::run_jobs(&jobs, ctx, self.config.engine.parallel)?;
        for update in pending {
            if let Some(slot) = self.slots.get_mut(&update.id) {
                slot.pending = Some(update);
            }
        }
        Ok(())
    }

    /// Folds the ready updates into a staged copy of the store in `order`,
    /// then commits it and advances the clocks of the merged processes.
    fn merge_ready(&mut self, order: &[ProcessId], round: u64) -> Result<Vec<Staged>> {
        let mut staged = self.composite.store.clone();
        let mut ledger = RoundLedger::new(round);
        let mut taken: Vec<Pending> = Vec::with_capacity(order.len());
        for id in order {
            let Some(pending) = self.slots.get_mut(id).and_then(|slot| slot.pending.take()) else {
                continue;
            };
            staged.merge(&pending.update, &self.registry, &mut ledger, &id.to_string())?;
            taken.push(pending);
        }
        self.composite.store = staged;

        let mut directives = Vec::new();
        for pending in taken {
            if let Some(slot) = self.slots.get_mut(&pending.id) {
                slot.clock = pending.completes;
            }
            directives.extend(
                pending
                    .directives
                    .into_iter()
                    .map(|(branch, directive)| (pending.id.clone(), branch, directive)),
            );
        }
        Ok(directives)
    }

    /// Runs every deriver once, in id order, merging each update before the
    /// next deriver reads.
    pub(crate) fn run_derivers(&mut self) -> Result<()> {
        let derivers: Vec<ProcessId> = self
            .composite
            .processes
            .values()
            .filter(|instance| instance.deriver)
            .map(|instance| instance.id.clone())
            .collect();
        let mut directives = Vec::new();
        for id in derivers {
            let (update, emitted) = {
                let Some(instance) = self.composite.process(&id) else {
                    continue;
                };
                let view = self.composite.view(instance)?;
                let step = instance
                    .process
                    .next_update(0.0, &view)
                    .map_err(|err| crate::error::SimError::process(&id, self.round, self.time, err))?;
                self.composite
                    .topology
                    .absolute_update(&id, &instance.ports, &step.update)?
            };
            self.composite.store.merge(
                &update,
                &self.registry,
                &mut RoundLedger::new(self.round),
                &id.to_string(),
            )?;
            if let Some(slot) = self.slots.get_mut(&id) {
                slot.clock = self.time;
            }
            directives.extend(
                emitted
                    .into_iter()
                    .map(|(branch, directive)| (id.clone(), branch, directive)),
            );
        }
        if !directives.is_empty() {
            let now = self.time;
            self.apply_structural(directives, now)?;
        }
        Ok(())
    }

    pub(crate) fn emit(&mut self) {
        let step = self.config.emitter.emit_step;
        let epsilon = self.config.engine.time_epsilon;
        let due = match self.last_emit {
            None => true,
            Some(last) => step <= 0.0 || self.time - last >= step - epsilon,
        };
        if due {
            self.emitter.emit(&self.composite.store, self.time, self.round);
            self.last_emit = Some(self.time);
        }
    }
}
