//! Error types for the sorting engine.
//!
//! `EngineError` covers both job-level failures (returned from `create_job`
//! and `run_job`, which stop a run before it starts) and per-file failures.
//! Per-file failures never propagate out of a worker; they are recorded in
//! the file's `TransferOutcome` and reported through the progress callback.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the engine.
///
/// Setup variants (`SourceNotFound`, `InvalidPath`, `InvalidPattern`,
/// `InvalidOption`) abort a job before any file is touched. Everything else
/// is scoped to one directory or one file.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source directory does not exist
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source directory is not accessible (permissions)
    #[error("Source directory access denied: {}", path.display())]
    SourceAccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read from source file
    #[error("Failed to read file: {}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to destination file
    #[error("Failed to write file: {}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Destination already exists and overwriting was not requested
    #[error("Destination already exists: {}", path.display())]
    DestinationExists { path: PathBuf },

    /// Path is unusable for this job
    #[error("Invalid path: {} ({reason})", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// The file pattern did not compile
    #[error("Invalid file pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// A job option is out of range
    #[error("Invalid option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    /// Failed to list a directory or stat one of its entries
    #[error("Failed to enumerate directory: {}", path.display())]
    EnumerationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a directory
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A cross-volume move copied the file but could not delete the source
    #[error("Copied but failed to remove source: {}", path.display())]
    SourceRemovalFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Work on this file was abandoned because the run was cancelled
    #[error("Cancelled: {}", path.display())]
    Cancelled { path: PathBuf },

    /// A worker panicked while processing a file
    #[error("Worker panicked while processing {}: {message}", path.display())]
    WorkerPanicked { path: PathBuf, message: String },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::SourceAccessDenied { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::SourceRemovalFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True for errors that abort a job before it runs.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::SourceAccessDenied { .. }
                | Self::InvalidPath { .. }
                | Self::InvalidPattern { .. }
                | Self::InvalidOption { .. }
        )
    }

    /// True if the error came from cancellation rather than a real failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
