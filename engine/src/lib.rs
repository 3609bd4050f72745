//! # mediasort engine - media file sorting library
//!
//! A headless engine that copies or moves photos, videos and other files
//! from a source tree into a date-organised target tree:
//! `<target>/<YYYY>/<MM. MonthName>/<timestamp>_<descriptors>_<original name>`.
//! Designed as the foundation for multiple front ends (CLI, automation).
//!
//! ## Overview
//!
//! The engine provides:
//! - Lazy, stack-based traversal with pattern and minimum-size filters
//! - Metadata resolution behind a trait (EXIF for photos out of the box)
//! - Deterministic target naming with collision-free suffixing
//! - A bounded worker pool with cooperative cancellation
//! - Progress reporting via callbacks (decoupled from UI technology)
//! - Per-file error isolation
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use mediasort_engine::{
//!     create_job, plan_job, run_job, CancellationToken, ExifMetadataResolver, JobOptions, Mode,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = JobOptions {
//!     recursive: true,
//!     ..JobOptions::new("/media/card/DCIM", "/photos/sorted", Mode::Copy)
//! };
//! let mut job = create_job(options, Arc::new(ExifMetadataResolver))?;
//!
//! let cancel = CancellationToken::new();
//! let total = plan_job(&mut job, &cancel)?;
//! println!("Will sort {} files", total);
//!
//! let summary = run_job(&job, &cancel, None)?;
//! println!("{} succeeded, {} failed", summary.succeeded, summary.failed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (ScanCandidate, TransferOutcome, RunSummary)
//! - **error**: Error types and handling
//! - **metadata**: Metadata resolver trait and the shipped resolvers
//! - **naming**: Timestamp policy, target layout and file name sanitizing
//! - **scan**: Directory traversal producer
//! - **fs_ops**: Uniqueness resolution and file transfer
//! - **job**: Job orchestration (create, plan, run)
//! - **progress**: Progress callback trait and aggregation
//! - **checksums**: Optional source file digests
//! - **cancel**: Cooperative cancellation token
//! - **options**: Job configuration

pub mod cancel;
pub mod checksums;
pub mod error;
pub mod fs_ops;
pub mod job;
pub mod metadata;
pub mod model;
pub mod naming;
pub mod options;
pub mod progress;
pub mod scan;

pub use cancel::CancellationToken;
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
pub use error::EngineError;
pub use fs_ops::{make_unique_path, transfer_file};
pub use job::{create_job, plan_job, run_job, SortJob};
pub use metadata::{
    ExifMetadataResolver, FsMetadataResolver, MediaKind, MetadataError, MetadataResolver,
    ResolvedMetadata,
};
pub use model::{Mode, OutcomeStatus, RunSummary, ScanCandidate, TransferOutcome};
pub use naming::{sanitize_file_name, NamingOptions, TargetPath, TargetPathResolver};
pub use options::JobOptions;
pub use progress::{ProgressCallback, ProgressSnapshot};
