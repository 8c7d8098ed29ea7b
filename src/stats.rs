//! Run statistics.
//!
//! Counters are atomics so the accumulator thread, the completion handler and
//! the session controller can all record into one shared instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Cumulative statistics for classification runs.
#[derive(Debug)]
pub struct RunStats {
    /// Samples for which transmission was attempted
    samples_started: AtomicU64,
    /// Samples that produced a classification
    samples_classified: AtomicU64,
    /// Classifications whose prediction matched the true class
    correct_predictions: AtomicU64,
    /// Event packets written to the event channel
    events_transmitted: AtomicU64,
    /// Result chunks dequeued by the accumulator, stale ones included
    chunks_received: AtomicU64,
    /// Completion notifications lost because the queue was full
    notification_overruns: AtomicU64,
    /// Samples that hit the session deadline
    stalls: AtomicU64,
    /// Samples aborted by storage, parse or channel errors
    failures: AtomicU64,
    /// Start of this process's run
    run_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            samples_started: AtomicU64::new(0),
            samples_classified: AtomicU64::new(0),
            correct_predictions: AtomicU64::new(0),
            events_transmitted: AtomicU64::new(0),
            chunks_received: AtomicU64::new(0),
            notification_overruns: AtomicU64::new(0),
            stalls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            run_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create statistics that load from and save to `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            warn!("could not load previous run statistics: {e}");
        }

        stats
    }

    pub fn record_sample_started(&self) {
        self.samples_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished classification.
    pub fn record_classified(&self, correct: bool) {
        self.samples_classified.fetch_add(1, Ordering::Relaxed);
        if correct {
            self.correct_predictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_events_transmitted(&self, count: u64) {
        self.events_transmitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_chunk_received(&self) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.notification_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stall(&self) {
        self.stalls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_started: self.samples_started.load(Ordering::Relaxed),
            samples_classified: self.samples_classified.load(Ordering::Relaxed),
            correct_predictions: self.correct_predictions.load(Ordering::Relaxed),
            events_transmitted: self.events_transmitted.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            notification_overruns: self.notification_overruns.load(Ordering::Relaxed),
            stalls: self.stalls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            run_start: self.run_start,
            run_duration_secs: (Utc::now() - self.run_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Run Statistics:\n\
             - Samples started: {}\n\
             - Samples classified: {}\n\
             - Correct predictions: {} ({:.1}%)\n\
             - Events transmitted: {}\n\
             - Chunks received: {}\n\
             - Notification overruns: {}\n\
             - Stalls: {}\n\
             - Failures: {}\n\
             - Run duration: {} seconds",
            stats.samples_started,
            stats.samples_classified,
            stats.correct_predictions,
            stats.accuracy() * 100.0,
            stats.events_transmitted,
            stats.chunks_received,
            stats.notification_overruns,
            stats.stalls,
            stats.failures,
            stats.run_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                samples_started: stats.samples_started,
                samples_classified: stats.samples_classified,
                correct_predictions: stats.correct_predictions,
                events_transmitted: stats.events_transmitted,
                chunks_received: stats.chunks_received,
                notification_overruns: stats.notification_overruns,
                stalls: stats.stalls,
                failures: stats.failures,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.samples_started
                    .store(persisted.samples_started, Ordering::Relaxed);
                self.samples_classified
                    .store(persisted.samples_classified, Ordering::Relaxed);
                self.correct_predictions
                    .store(persisted.correct_predictions, Ordering::Relaxed);
                self.events_transmitted
                    .store(persisted.events_transmitted, Ordering::Relaxed);
                self.chunks_received
                    .store(persisted.chunks_received, Ordering::Relaxed);
                self.notification_overruns
                    .store(persisted.notification_overruns, Ordering::Relaxed);
                self.stalls.store(persisted.stalls, Ordering::Relaxed);
                self.failures.store(persisted.failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub samples_started: u64,
    pub samples_classified: u64,
    pub correct_predictions: u64,
    pub events_transmitted: u64,
    pub chunks_received: u64,
    pub notification_overruns: u64,
    pub stalls: u64,
    pub failures: u64,
    pub run_start: DateTime<Utc>,
    pub run_duration_secs: u64,
}

impl StatsSnapshot {
    /// Fraction of classified samples predicted correctly.
    pub fn accuracy(&self) -> f64 {
        if self.samples_classified == 0 {
            0.0
        } else {
            self.correct_predictions as f64 / self.samples_classified as f64
        }
    }
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    samples_started: u64,
    samples_classified: u64,
    correct_predictions: u64,
    events_transmitted: u64,
    chunks_received: u64,
    notification_overruns: u64,
    stalls: u64,
    failures: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared statistics.
pub type SharedRunStats = Arc<RunStats>;

pub fn create_shared_stats() -> SharedRunStats {
    Arc::new(RunStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedRunStats {
    Arc::new(RunStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_and_accuracy() {
        let stats = RunStats::new();

        stats.record_sample_started();
        stats.record_sample_started();
        stats.record_classified(true);
        stats.record_classified(false);
        stats.record_events_transmitted(120);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.samples_started, 2);
        assert_eq!(snapshot.samples_classified, 2);
        assert_eq!(snapshot.events_transmitted, 120);
        assert!((snapshot.accuracy() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_accuracy_without_samples() {
        assert_eq!(RunStats::new().snapshot().accuracy(), 0.0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");

        let stats = RunStats::with_persistence(path.clone());
        stats.record_stall();
        stats.record_chunk_received();
        stats.save().unwrap();

        let reloaded = RunStats::with_persistence(path);
        let snapshot = reloaded.snapshot();
        assert_eq!(snapshot.stalls, 1);
        assert_eq!(snapshot.chunks_received, 1);
    }

    #[test]
    fn test_summary_format() {
        let summary = RunStats::new().summary();
        assert!(summary.contains("Samples classified"));
        assert!(summary.contains("Stalls"));
    }
}
