//! Run statistics and logging setup.
//!
//! Counters are atomics so process threads and the driver can read them
//! without taking the engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Metrics collector for one engine.
pub struct Metrics {
    round_count: AtomicU64,
    invocations: AtomicU64,
    divisions: AtomicU64,
    additions: AtomicU64,
    deletions: AtomicU64,
    process_count: AtomicU64,
    summary_interval: u64,
    pub counters: Mutex<HashMap<String, AtomicU64>>,
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("rounds", &self.round_count())
            .field("invocations", &self.invocations())
            .field("divisions", &self.divisions())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    #[must_use]
    pub fn new(summary_interval: u64) -> Self {
        Self {
            round_count: AtomicU64::new(0),
            invocations: AtomicU64::new(0),
            divisions: AtomicU64::new(0),
            additions: AtomicU64::new(0),
            deletions: AtomicU64::new(0),
            process_count: AtomicU64::new(0),
            summary_interval: summary_interval.max(1),
            counters: Mutex::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Records a completed round.
    pub fn record_round(&self, duration: Duration, time: f64, invoked: usize, processes: usize) {
        self.round_count.fetch_add(1, Ordering::Relaxed);
        self.invocations.fetch_add(invoked as u64, Ordering::Relaxed);
        self.process_count.store(processes as u64, Ordering::Relaxed);

        let round = self.round_count.load(Ordering::Relaxed);
        if round % self.summary_interval == 0 {
            tracing::info!(
                round = round,
                time = time,
                processes = processes,
                invocations = self.invocations(),
                duration_us = duration.as_micros() as u64,
                "Simulation round"
            );
        }
    }

    pub fn record_division(&self) {
        self.divisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_addition(&self) {
        self.additions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deletion(&self) {
        self.deletions.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments a named counter.
    pub fn increment_counter(&self, name: &str) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .get(name)
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn round_count(&self) -> u64 {
        self.round_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn divisions(&self) -> u64 {
        self.divisions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn additions(&self) -> u64 {
        self.additions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn deletions(&self) -> u64 {
        self.deletions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn process_count(&self) -> u64 {
        self.process_count.load(Ordering::Relaxed)
    }

    /// Gets elapsed wall time since metrics creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Logs a structural event.
    pub fn log_event(&self, event_type: &str, details: &str) {
        tracing::info!(
            event_type = event_type,
            details = details,
            "Simulation event"
        );
    }
}

/// Installs a global fmt subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .finish(),
    )
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::default();
        assert_eq!(metrics.round_count(), 0);
        assert_eq!(metrics.divisions(), 0);
    }

    #[test]
    fn test_record_round() {
        let metrics = Metrics::new(1);
        metrics.record_round(Duration::from_millis(2), 1.0, 3, 5);
        metrics.record_round(Duration::from_millis(2), 2.0, 2, 5);
        assert_eq!(metrics.round_count(), 2);
        assert_eq!(metrics.invocations(), 5);
        assert_eq!(metrics.process_count(), 5);
    }

    #[test]
    fn test_counters() {
        let metrics = Metrics::default();
        metrics.increment_counter("merge.shuffled");
        metrics.increment_counter("merge.shuffled");
        metrics.record_division();
        assert_eq!(metrics.counter("merge.shuffled"), 2);
        assert_eq!(metrics.counter("missing"), 0);
        assert_eq!(metrics.divisions(), 1);
    }
}
