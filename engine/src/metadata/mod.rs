//! Metadata resolver boundary.
//!
//! The engine asks a `MetadataResolver` for the embedded attributes of each
//! candidate. Exactly one `ResolvedMetadata` variant is attached to a file,
//! chosen from its extension. Two resolvers ship with the engine:
//! `FsMetadataResolver` (no embedded fields) and `ExifMetadataResolver`
//! (EXIF tags from photos).

mod exif_reader;

use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use thiserror::Error;

pub use exif_reader::{parse_datetime, ExifMetadataResolver};

const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "tiff", "bmp", "gif", "heic", "webp", "dng", "raw", "cr2", "rw2", "mpo",
    "psd",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mpg", "mov", "avi", "mkv", "wmv", "flv", "webm", "mts", "m2ts", "3gp",
];

/// Media family of a file, decided by extension only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Other,
}

impl MediaKind {
    pub fn from_extension(extension: &str) -> Self {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if PHOTO_EXTENSIONS.contains(&extension.as_str()) {
            MediaKind::Photo
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            MediaKind::Video
        } else {
            MediaKind::Other
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(MediaKind::Other)
    }
}

/// Decimal degrees, negative for south and west.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoMetadata {
    /// EXIF DateTimeOriginal
    pub taken_at: Option<NaiveDateTime>,
    /// EXIF DateTimeDigitized
    pub modified_at: Option<NaiveDateTime>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub gps: Option<GpsCoordinate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoMetadata {
    pub created_at: Option<NaiveDateTime>,
    pub modified_at: Option<NaiveDateTime>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Embedded attributes of one file.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedMetadata {
    Photo(PhotoMetadata),
    Video(VideoMetadata),
    /// Nothing embedded; only filesystem timestamps apply
    Generic,
}

impl ResolvedMetadata {
    /// The variant with every embedded field absent for `kind`.
    pub fn empty(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Photo => ResolvedMetadata::Photo(PhotoMetadata::default()),
            MediaKind::Video => ResolvedMetadata::Video(VideoMetadata::default()),
            MediaKind::Other => ResolvedMetadata::Generic,
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            ResolvedMetadata::Photo(_) => MediaKind::Photo,
            ResolvedMetadata::Video(_) => MediaKind::Video,
            ResolvedMetadata::Generic => MediaKind::Other,
        }
    }
}

/// Failures a resolver may report. The engine recovers from all of them by
/// falling back to filesystem timestamps.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read metadata from {}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt metadata in {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

impl MetadataError {
    fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            MetadataError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            MetadataError::Unreadable {
                path: path.to_path_buf(),
                source: err,
            }
        }
    }
}

/// Extracts embedded metadata for one file.
///
/// Called concurrently from every worker thread, once per file, so
/// implementations must not rely on shared mutable state.
pub trait MetadataResolver: Send + Sync {
    fn resolve(&self, path: &Path) -> Result<ResolvedMetadata, MetadataError>;
}

/// Resolver that reads nothing from file contents.
///
/// It still picks the variant from the extension, so photos and videos
/// get the media-specific naming rules with every embedded field absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsMetadataResolver;

impl MetadataResolver for FsMetadataResolver {
    fn resolve(&self, path: &Path) -> Result<ResolvedMetadata, MetadataError> {
        let metadata = std::fs::metadata(path).map_err(|e| MetadataError::from_io(path, e))?;
        if !metadata.is_file() {
            return Err(MetadataError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(ResolvedMetadata::empty(MediaKind::from_path(path)))
    }
}
