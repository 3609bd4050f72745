//! Core data model for sorting runs.
//!
//! - ScanCandidate: one file found by the traversal producer
//! - TransferOutcome: what happened to one candidate
//! - RunSummary: final totals of a run
//! - Mode, OutcomeStatus: enums controlling and describing behavior

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Deserialize;
use uuid::Uuid;

use crate::checksums::ChecksumValue;
use crate::error::EngineError;

/// A file discovered beneath the source root that passed the pattern and
/// size filters. Produced once, consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCandidate {
    /// Full source path
    pub path: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Last write time, local wall clock
    pub modified: NaiveDateTime,

    /// Creation time, if the platform reports one
    pub created: Option<NaiveDateTime>,

    pub is_read_only: bool,
    pub is_hidden: bool,
    pub is_system: bool,
}

impl ScanCandidate {
    /// Build a candidate from an already fetched `fs::Metadata`.
    pub fn from_metadata(path: PathBuf, metadata: &fs::Metadata) -> Self {
        let modified = metadata
            .modified()
            .map(to_local_naive)
            .unwrap_or_else(|_| to_local_naive(SystemTime::UNIX_EPOCH));
        let created = metadata.created().ok().map(to_local_naive);
        let is_hidden = is_hidden(&path, metadata);
        let is_system = is_system(metadata);

        ScanCandidate {
            size: metadata.len(),
            modified,
            created,
            is_read_only: metadata.permissions().readonly(),
            is_hidden,
            is_system,
            path,
        }
    }

    /// The file name with extension, lossily converted.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn to_local_naive(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

#[cfg(windows)]
fn is_hidden(_path: &Path, metadata: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0
}

#[cfg(not(windows))]
fn is_hidden(path: &Path, _metadata: &fs::Metadata) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(windows)]
fn is_system(metadata: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    metadata.file_attributes() & FILE_ATTRIBUTE_SYSTEM != 0
}

#[cfg(not(windows))]
fn is_system(_metadata: &fs::Metadata) -> bool {
    false
}

/// The operation mode for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Copy files; source remains unchanged
    #[default]
    Copy,
    /// Move files; source removed after the transfer
    Move,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Copy => write!(f, "Copy"),
            Mode::Move => write!(f, "Move"),
        }
    }
}

/// Terminal state of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
}

/// Result of processing one candidate. Created by a worker, consumed by the
/// aggregator, never mutated afterwards.
#[derive(Debug)]
pub struct TransferOutcome {
    pub candidate: ScanCandidate,
    pub status: OutcomeStatus,

    /// Final destination, if it was computed before any failure
    pub destination: Option<PathBuf>,

    /// Failure detail when `status` is `Failed`
    pub error: Option<EngineError>,

    /// Bytes written or moved to the destination
    pub bytes_transferred: u64,

    /// Source digest, when the job asked for one
    pub checksum: Option<ChecksumValue>,
}

impl TransferOutcome {
    pub fn succeeded(
        candidate: ScanCandidate,
        destination: PathBuf,
        bytes_transferred: u64,
        checksum: Option<ChecksumValue>,
    ) -> Self {
        TransferOutcome {
            candidate,
            status: OutcomeStatus::Succeeded,
            destination: Some(destination),
            error: None,
            bytes_transferred,
            checksum,
        }
    }

    pub fn failed(candidate: ScanCandidate, destination: Option<PathBuf>, error: EngineError) -> Self {
        TransferOutcome {
            candidate,
            status: OutcomeStatus::Failed,
            destination,
            error: Some(error),
            bytes_transferred: 0,
            checksum: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

/// Final totals of a run, returned by `run_job`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub job_id: Uuid,
    pub mode: Mode,

    /// Files emitted by the traversal producer
    pub discovered: u64,

    /// Files a worker started on
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub bytes_transferred: u64,

    /// True if the cancellation token fired during the run
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_candidate_from_metadata() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("IMG_0001.JPG");
        let mut file = fs::File::create(&path).expect("Failed to create file");
        file.write_all(b"0123456789").expect("Failed to write file");
        drop(file);

        let metadata = fs::metadata(&path).expect("Failed to stat file");
        let candidate = ScanCandidate::from_metadata(path.clone(), &metadata);

        assert_eq!(candidate.path, path);
        assert_eq!(candidate.size, 10);
        assert_eq!(candidate.file_name(), "IMG_0001.JPG");
        assert!(!candidate.is_read_only);
        assert!(!candidate.is_system);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_dot_files_are_hidden() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join(".thumbnail");
        fs::write(&path, b"x").expect("Failed to write file");

        let metadata = fs::metadata(&path).expect("Failed to stat file");
        assert!(ScanCandidate::from_metadata(path, &metadata).is_hidden);
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::Copy.to_string(), "Copy");
        assert_eq!(Mode::Move.to_string(), "Move");
        assert_eq!(Mode::default(), Mode::Copy);
    }
}
