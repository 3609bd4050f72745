//! Progress reporting.
//!
//! This module defines the ProgressCallback trait, which allows decoupling
//! the sorting engine from any specific UI technology, plus the run-scoped
//! counters and the aggregator that turns per-file outcomes into progress
//! snapshots.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::EngineError;
use crate::job::SortJob;
use crate::model::{RunSummary, TransferOutcome};

/// Trait for receiving progress updates from a sorting run.
///
/// Implement this trait to receive callbacks during job execution. The CLI
/// provides an implementation that prints to stderr.
///
/// `on_directory_entered` and traversal errors arrive on the producer
/// thread; everything else arrives on the thread that called `run_job`.
pub trait ProgressCallback: Send + Sync {
    /// Called once before any file is dispatched.
    fn on_run_started(&self, _job: &SortJob) {}

    /// Called when the traversal starts listing a directory.
    fn on_directory_entered(&self, _dir: &Path) {}

    /// Called for every error as it happens: directories that could not be
    /// listed and files that failed.
    fn on_error(&self, _error: &EngineError) {}

    /// Called after each file reaches a terminal state.
    fn on_file_completed(&self, outcome: &TransferOutcome, progress: &ProgressSnapshot);

    /// Called once after every worker has finished.
    fn on_run_completed(&self, _summary: &RunSummary) {}
}

/// Counters shared by the producer, the workers and the aggregator for the
/// duration of one run.
#[derive(Debug, Default)]
pub struct RunTotals {
    discovered: AtomicU64,
    attempted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    bytes_transferred: AtomicU64,
}

impl RunTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_discovered(&self) {
        self.discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt(&self) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn discovered(&self) -> u64 {
        self.discovered.load(Ordering::Relaxed)
    }

    pub fn attempted(&self) -> u64 {
        self.attempted.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Files that reached a terminal state
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub bytes_transferred: u64,

    /// Planned total, or files discovered so far when no count was made.
    /// Never zero and never below `processed`.
    pub total: u64,
}

impl ProgressSnapshot {
    /// Completion in the range `0.0..=100.0`.
    pub fn percent(&self) -> f64 {
        let percent = self.processed as f64 * 100.0 / self.total.max(1) as f64;
        percent.clamp(0.0, 100.0)
    }
}

/// Folds outcomes into `RunTotals` and forwards them to the callback.
pub struct Aggregator<'a> {
    totals: &'a RunTotals,
    planned_total: Option<u64>,
    callback: Option<&'a dyn ProgressCallback>,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        totals: &'a RunTotals,
        planned_total: Option<u64>,
        callback: Option<&'a dyn ProgressCallback>,
    ) -> Self {
        Aggregator {
            totals,
            planned_total,
            callback,
        }
    }

    pub fn record(&self, outcome: &TransferOutcome) -> ProgressSnapshot {
        if outcome.is_success() {
            self.totals.succeeded.fetch_add(1, Ordering::Relaxed);
            self.totals
                .bytes_transferred
                .fetch_add(outcome.bytes_transferred, Ordering::Relaxed);
        } else {
            self.totals.failed.fetch_add(1, Ordering::Relaxed);
        }

        let snapshot = self.snapshot();
        if let Some(callback) = self.callback {
            if let Some(error) = &outcome.error {
                callback.on_error(error);
            }
            callback.on_file_completed(outcome, &snapshot);
        }
        snapshot
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let succeeded = self.totals.succeeded();
        let failed = self.totals.failed();
        let processed = succeeded + failed;
        let denominator = self
            .planned_total
            .unwrap_or_else(|| self.totals.discovered());

        ProgressSnapshot {
            processed,
            succeeded,
            failed,
            bytes_transferred: self.totals.bytes_transferred(),
            total: denominator.max(processed).max(1),
        }
    }
}
