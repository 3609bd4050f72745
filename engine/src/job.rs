//! Job orchestration module.
//!
//! This module provides the main job lifecycle functions:
//! - Creating a job from options and a metadata resolver
//! - Planning a job (counting candidates for a stable progress total)
//! - Running a job (traversal producer, worker pool and aggregator)
//!
//! A run uses one producer thread feeding a bounded channel, N workers each
//! taking one candidate at a time through resolve, name, uniquify and
//! transfer, and an aggregator on the calling thread. All threads are
//! scoped, so they borrow the job instead of cloning it.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Instant, SystemTime};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::checksums::compute_file_checksum;
use crate::error::EngineError;
use crate::fs_ops;
use crate::metadata::{MediaKind, MetadataResolver, ResolvedMetadata};
use crate::model::{RunSummary, ScanCandidate, TransferOutcome};
use crate::naming::TargetPathResolver;
use crate::options::JobOptions;
use crate::progress::{Aggregator, ProgressCallback, RunTotals};
use crate::scan::{count_candidates, FilePattern, ScanObserver, ScanOptions, Scanner};

/// A validated sorting run, ready to be planned and executed.
pub struct SortJob {
    pub id: Uuid,
    pub options: JobOptions,
    pub created_at: SystemTime,

    /// Candidate count from `plan_job`, used as the progress denominator
    pub planned_total: Option<u64>,

    resolver: Arc<dyn MetadataResolver>,
    scan: ScanOptions,
    namer: TargetPathResolver,
}

impl SortJob {
    pub fn scan_options(&self) -> &ScanOptions {
        &self.scan
    }

    pub fn worker_count(&self) -> usize {
        self.options.worker_count()
    }
}

impl fmt::Debug for SortJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortJob")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("created_at", &self.created_at)
            .field("planned_total", &self.planned_total)
            .finish_non_exhaustive()
    }
}

/// Create a new sorting job.
///
/// # Arguments
/// * `options` - What to sort and how
/// * `resolver` - Source of embedded metadata, shared by every worker
///
/// # Returns
/// A new SortJob with no planned total
///
/// # Errors
/// Returns EngineError if the source doesn't exist or is not a directory,
/// the pattern or locale is invalid, an option is out of range, or a
/// recursive scan would descend into the target.
pub fn create_job(
    options: JobOptions,
    resolver: Arc<dyn MetadataResolver>,
) -> Result<SortJob, EngineError> {
    options.validate()?;
    check_source_dir(&options.source)?;

    if options.recursive && is_within(&options.target, &options.source) {
        return Err(EngineError::InvalidPath {
            path: options.target.clone(),
            reason: "Target must not be inside the source for a recursive run".to_string(),
        });
    }

    let scan = ScanOptions {
        root: options.source.clone(),
        pattern: FilePattern::new(&options.pattern)?,
        recursive: options.recursive,
        min_file_size: options.min_file_size,
    };
    let namer = TargetPathResolver::new(&options.naming)?;

    Ok(SortJob {
        id: Uuid::new_v4(),
        options,
        created_at: SystemTime::now(),
        planned_total: None,
        resolver,
        scan,
        namer,
    })
}

/// Plan a job by counting the candidates a run would process.
///
/// Sets `job.planned_total` so progress reports a stable denominator.
/// Skipping this step is allowed; progress then streams against the number
/// of files discovered so far.
///
/// # Errors
/// Returns `EngineError::Cancelled` if `cancel` fired during the count; the
/// job is left unplanned.
pub fn plan_job(job: &mut SortJob, cancel: &CancellationToken) -> Result<u64, EngineError> {
    let count = count_candidates(&job.scan, cancel);
    cancel.check(&job.options.source)?;

    debug!(job_id = %job.id, count, "planned job");
    job.planned_total = Some(count);
    Ok(count)
}

/// Run a job to completion or cancellation.
///
/// Individual file errors are reported through the callback and counted in
/// the summary but do NOT stop the job. Cancellation stops dispatching new
/// files; files already in flight end as `Cancelled` failures.
///
/// # Arguments
/// * `job` - Job to execute
/// * `cancel` - Token observed by every thread of the run
/// * `progress_callback` - Optional callback for progress updates
///
/// # Errors
/// Returns EngineError only when the source directory is gone or
/// unreadable before the run starts.
pub fn run_job(
    job: &SortJob,
    cancel: &CancellationToken,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<RunSummary, EngineError> {
    check_source_dir(&job.options.source)?;

    let span = info_span!("run", job_id = %job.id);
    let _entered = span.enter();

    let workers = job.worker_count();
    info!(
        source = %job.options.source.display(),
        target = %job.options.target.display(),
        mode = %job.options.mode,
        workers,
        "starting run"
    );

    if let Some(callback) = progress_callback {
        callback.on_run_started(job);
    }

    let started = Instant::now();
    let totals = RunTotals::new();

    let (work_tx, work_rx) = bounded::<ScanCandidate>(job.options.queue_capacity);
    let (outcome_tx, outcome_rx) = unbounded::<TransferOutcome>();

    thread::scope(|scope| {
        let totals = &totals;

        {
            let span = span.clone();
            scope.spawn(move || {
                let _entered = span.enter();
                produce(job, cancel, progress_callback, totals, work_tx);
            });
        }

        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let outcome_tx = outcome_tx.clone();
            let span = span.clone();
            scope.spawn(move || {
                let _entered = span.enter();
                work(job, cancel, totals, work_rx, outcome_tx);
            });
        }

        // The outcome channel closes once the last worker drops its sender
        drop(work_rx);
        drop(outcome_tx);

        let aggregator = Aggregator::new(totals, job.planned_total, progress_callback);
        for outcome in outcome_rx.iter() {
            aggregator.record(&outcome);
        }
    });

    let summary = RunSummary {
        job_id: job.id,
        mode: job.options.mode,
        discovered: totals.discovered(),
        attempted: totals.attempted(),
        succeeded: totals.succeeded(),
        failed: totals.failed(),
        bytes_transferred: totals.bytes_transferred(),
        cancelled: cancel.is_cancelled(),
        elapsed: started.elapsed(),
    };

    info!(
        discovered = summary.discovered,
        succeeded = summary.succeeded,
        failed = summary.failed,
        cancelled = summary.cancelled,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "run finished"
    );

    if let Some(callback) = progress_callback {
        callback.on_run_completed(&summary);
    }

    Ok(summary)
}

fn check_source_dir(source: &Path) -> Result<(), EngineError> {
    // Validate source exists and is a directory
    match std::fs::metadata(source) {
        Ok(metadata) => {
            if metadata.is_dir() {
                Ok(())
            } else {
                Err(EngineError::InvalidPath {
                    path: source.to_path_buf(),
                    reason: "Source must be a directory".to_string(),
                })
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::SourceNotFound {
            path: source.to_path_buf(),
        }),
        Err(e) => Err(EngineError::SourceAccessDenied {
            path: source.to_path_buf(),
            source: e,
        }),
    }
}

/// True if `path` is `root` or lies beneath it, comparing canonical forms.
fn is_within(path: &Path, root: &Path) -> bool {
    match root.canonicalize() {
        Ok(root) => canonicalize_lenient(path).starts_with(root),
        Err(_) => false,
    }
}

// Canonicalizes the longest existing ancestor and re-appends the rest, so
// a target that does not exist yet still compares correctly.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut tail = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return tail.iter().rev().fold(canonical, |acc, name| acc.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Forwards traversal notifications to the progress callback.
struct TraversalReporter<'a> {
    callback: Option<&'a dyn ProgressCallback>,
}

impl ScanObserver for TraversalReporter<'_> {
    fn directory_entered(&self, dir: &Path) {
        if let Some(callback) = self.callback {
            callback.on_directory_entered(dir);
        }
    }

    fn scan_error(&self, error: &EngineError) {
        warn!(error = %error, "traversal error");
        if let Some(callback) = self.callback {
            callback.on_error(error);
        }
    }
}

// Dropping `work_tx` on return (or unwind) closes the distribution channel.
fn produce(
    job: &SortJob,
    cancel: &CancellationToken,
    callback: Option<&dyn ProgressCallback>,
    totals: &RunTotals,
    work_tx: Sender<ScanCandidate>,
) {
    let reporter = TraversalReporter { callback };
    let scanned = panic::catch_unwind(AssertUnwindSafe(|| {
        for candidate in Scanner::new(&job.scan, cancel, &reporter) {
            select! {
                send(work_tx, candidate) -> sent => {
                    if sent.is_err() {
                        break;
                    }
                    totals.record_discovered();
                }
                recv(cancel.signal()) -> _ => break,
            }
        }
    }));

    if let Err(payload) = scanned {
        warn!(message = %panic_message(payload.as_ref()), "traversal panicked");
    }
}

fn work(
    job: &SortJob,
    cancel: &CancellationToken,
    totals: &RunTotals,
    work_rx: Receiver<ScanCandidate>,
    outcome_tx: Sender<TransferOutcome>,
) {
    loop {
        let candidate = select! {
            recv(work_rx) -> received => match received {
                Ok(candidate) => candidate,
                Err(_) => break,
            },
            recv(cancel.signal()) -> _ => break,
        };

        // No new file starts once the token has fired
        if cancel.is_cancelled() {
            break;
        }

        totals.record_attempt();
        let outcome = process_guarded(job, cancel, candidate);
        if outcome_tx.send(outcome).is_err() {
            break;
        }
    }
}

fn process_guarded(
    job: &SortJob,
    cancel: &CancellationToken,
    candidate: ScanCandidate,
) -> TransferOutcome {
    let fallback = candidate.clone();
    match panic::catch_unwind(AssertUnwindSafe(|| process_file(job, cancel, candidate))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(path = %fallback.path.display(), %message, "worker panicked");
            let path = fallback.path.clone();
            TransferOutcome::failed(fallback, None, EngineError::WorkerPanicked { path, message })
        }
    }
}

/// Resolve, name, uniquify and transfer one file.
fn process_file(
    job: &SortJob,
    cancel: &CancellationToken,
    candidate: ScanCandidate,
) -> TransferOutcome {
    let options = &job.options;

    let metadata = match job.resolver.resolve(&candidate.path) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(
                path = %candidate.path.display(),
                error = %e,
                "metadata unavailable, using file times"
            );
            ResolvedMetadata::empty(MediaKind::from_path(&candidate.path))
        }
    };

    let target = job.namer.resolve(&candidate, &metadata).under(&options.target);

    let checksum = match options.checksum {
        Some(algorithm) => match compute_file_checksum(&candidate.path, algorithm, cancel) {
            Ok(value) => Some(value),
            Err(e) => return failed(candidate, Some(target), e),
        },
        None => None,
    };

    let destination = if options.overwrite {
        fs_ops::ensure_parent_dir_exists(&target).map(|()| target.clone())
    } else {
        fs_ops::make_unique_path(&target)
    };
    let destination = match destination {
        Ok(destination) => destination,
        Err(e) => return failed(candidate, Some(target), e),
    };

    let transferred = fs_ops::transfer_file(
        &candidate.path,
        &destination,
        options.mode,
        options.overwrite,
        cancel,
    );
    match transferred {
        Ok(bytes) => {
            debug!(
                src = %candidate.path.display(),
                dst = %destination.display(),
                bytes,
                "transferred"
            );
            TransferOutcome::succeeded(candidate, destination, bytes, checksum)
        }
        Err(e) => failed(candidate, Some(destination), e),
    }
}

fn failed(
    candidate: ScanCandidate,
    destination: Option<PathBuf>,
    error: EngineError,
) -> TransferOutcome {
    if error.is_cancelled() {
        debug!(path = %candidate.path.display(), "cancelled");
    } else {
        warn!(path = %candidate.path.display(), error = %error, "file failed");
    }
    TransferOutcome::failed(candidate, destination, error)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
