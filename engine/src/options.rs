//! Job configuration.

use std::path::PathBuf;

use serde::Deserialize;

use crate::checksums::ChecksumAlgorithm;
use crate::error::EngineError;
use crate::model::Mode;
use crate::naming::NamingOptions;

pub const DEFAULT_PATTERN: &str = "*.*";
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Everything a sorting run needs to know.
///
/// Deserializable from TOML; every field is optional there and falls back
/// to `Default`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    pub source: PathBuf,
    pub target: PathBuf,
    pub mode: Mode,

    /// Glob matched against the file name only
    pub pattern: String,
    pub recursive: bool,
    pub overwrite: bool,

    /// Files smaller than this many bytes are skipped
    pub min_file_size: u64,

    /// Worker threads; `None` means one per logical CPU
    pub workers: Option<usize>,

    /// Candidates buffered between the producer and the workers
    pub queue_capacity: usize,

    pub naming: NamingOptions,

    /// Hash each source file before transferring it
    pub checksum: Option<ChecksumAlgorithm>,
}

impl Default for JobOptions {
    fn default() -> Self {
        JobOptions {
            source: PathBuf::new(),
            target: PathBuf::new(),
            mode: Mode::Copy,
            pattern: DEFAULT_PATTERN.to_string(),
            recursive: false,
            overwrite: false,
            min_file_size: 0,
            workers: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            naming: NamingOptions::default(),
            checksum: None,
        }
    }
}

impl JobOptions {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>, mode: Mode) -> Self {
        JobOptions {
            source: source.into(),
            target: target.into(),
            mode,
            ..JobOptions::default()
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Range checks that need no filesystem access.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.source.as_os_str().is_empty() {
            return Err(EngineError::InvalidPath {
                path: self.source.clone(),
                reason: "source path is empty".to_string(),
            });
        }
        if self.target.as_os_str().is_empty() {
            return Err(EngineError::InvalidPath {
                path: self.target.clone(),
                reason: "target path is empty".to_string(),
            });
        }
        if self.workers == Some(0) {
            return Err(EngineError::InvalidOption {
                name: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::InvalidOption {
                name: "queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = JobOptions::new("/in", "/out", Mode::Move);
        assert_eq!(options.pattern, "*.*");
        assert_eq!(options.queue_capacity, 256);
        assert_eq!(options.mode, Mode::Move);
        assert!(options.naming.include_dimensions);
        assert!(!options.naming.include_gps);
        assert!(options.worker_count() >= 1);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let options = JobOptions {
            workers: Some(0),
            ..JobOptions::new("/in", "/out", Mode::Copy)
        };
        assert!(matches!(
            options.validate(),
            Err(EngineError::InvalidOption { name: "workers", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_queue() {
        let options = JobOptions {
            queue_capacity: 0,
            ..JobOptions::new("/in", "/out", Mode::Copy)
        };
        assert!(matches!(
            options.validate(),
            Err(EngineError::InvalidOption { name: "queue_capacity", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        let options = JobOptions::default();
        assert!(matches!(options.validate(), Err(EngineError::InvalidPath { .. })));
    }
}
