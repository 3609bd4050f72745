//! Target path resolution.
//!
//! Maps a candidate and its resolved metadata to
//! `<YYYY>/<MM. MonthName>/<file name>`. Resolution is a pure function of
//! its inputs: it never touches the filesystem, so the uniqueness step can
//! call it again safely and tests need no fixtures.

use std::path::{Path, PathBuf};

use chrono::{Locale, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::error::EngineError;
use crate::metadata::{GpsCoordinate, ResolvedMetadata};
use crate::model::ScanCandidate;

/// Compact numeric timestamp embedded in every constructed file name.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Replaces each run of illegal characters.
const REPLACEMENT: &str = "-";

/// File naming settings for a job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NamingOptions {
    /// Prepended to every file name, followed by `_`
    pub prefix: Option<String>,

    /// Add a `(WxH)` segment when both dimensions are known
    pub include_dimensions: bool,

    /// Add a `(Gps=lat lon)` segment for photos with coordinates
    pub include_gps: bool,

    /// Locale used for the month folder name, e.g. `en_US` or `de_DE`
    pub month_locale: String,
}

impl Default for NamingOptions {
    fn default() -> Self {
        NamingOptions {
            prefix: None,
            include_dimensions: true,
            include_gps: false,
            month_locale: "en_US".to_string(),
        }
    }
}

/// Destination of one file relative to the target root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPath {
    /// Four digit year, e.g. `2025`
    pub year: String,
    /// Two digit month and month name, e.g. `11. November`
    pub month: String,
    pub file_name: String,
}

impl TargetPath {
    pub fn relative(&self) -> PathBuf {
        [self.year.as_str(), self.month.as_str(), self.file_name.as_str()]
            .iter()
            .collect()
    }

    /// Full destination beneath `root`.
    pub fn under(&self, root: &Path) -> PathBuf {
        root.join(self.relative())
    }
}

/// Pick the single timestamp used for bucketing and naming.
///
/// - Photo: embedded modified, then embedded taken, then filesystem modified
/// - Video: embedded modified, then embedded created, then filesystem modified
/// - Generic: filesystem created, then filesystem modified
pub fn pick_timestamp(candidate: &ScanCandidate, metadata: &ResolvedMetadata) -> NaiveDateTime {
    match metadata {
        ResolvedMetadata::Photo(photo) => photo
            .modified_at
            .or(photo.taken_at)
            .unwrap_or(candidate.modified),
        ResolvedMetadata::Video(video) => video
            .modified_at
            .or(video.created_at)
            .unwrap_or(candidate.modified),
        ResolvedMetadata::Generic => candidate.created.unwrap_or(candidate.modified),
    }
}

/// Naming options compiled for repeated use by every worker.
#[derive(Debug, Clone)]
pub struct TargetPathResolver {
    prefix: Option<String>,
    include_dimensions: bool,
    include_gps: bool,
    locale: Locale,
}

impl TargetPathResolver {
    pub fn new(options: &NamingOptions) -> Result<Self, EngineError> {
        let locale = Locale::try_from(options.month_locale.as_str()).map_err(|_| {
            EngineError::InvalidOption {
                name: "month_locale",
                reason: format!("unknown locale '{}'", options.month_locale),
            }
        })?;

        Ok(TargetPathResolver {
            prefix: options
                .prefix
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            include_dimensions: options.include_dimensions,
            include_gps: options.include_gps,
            locale,
        })
    }

    pub fn resolve(&self, candidate: &ScanCandidate, metadata: &ResolvedMetadata) -> TargetPath {
        let timestamp = pick_timestamp(candidate, metadata);

        TargetPath {
            year: timestamp.format("%Y").to_string(),
            month: self.month_folder(&timestamp),
            file_name: self.file_name(candidate, metadata, &timestamp),
        }
    }

    fn month_folder(&self, timestamp: &NaiveDateTime) -> String {
        let month_name = Utc
            .from_utc_datetime(timestamp)
            .format_localized("%B", self.locale)
            .to_string();
        sanitize_file_name(&format!("{}. {}", timestamp.format("%m"), month_name))
    }

    fn file_name(
        &self,
        candidate: &ScanCandidate,
        metadata: &ResolvedMetadata,
        timestamp: &NaiveDateTime,
    ) -> String {
        let mut segments: Vec<String> = Vec::with_capacity(6);

        if let Some(prefix) = &self.prefix {
            segments.push(prefix.clone());
        }
        segments.push(timestamp.format(TIMESTAMP_FORMAT).to_string());

        match metadata {
            ResolvedMetadata::Photo(photo) => {
                if let Some(camera) =
                    camera_descriptor(photo.camera_make.as_deref(), photo.camera_model.as_deref())
                {
                    segments.push(format!("({})", camera));
                }
                if self.include_dimensions {
                    if let Some(dimensions) = dimensions_descriptor(photo.width, photo.height) {
                        segments.push(format!("({})", dimensions));
                    }
                }
                if self.include_gps {
                    if let Some(gps) = photo.gps {
                        segments.push(format!("(Gps={})", gps_descriptor(&gps)));
                    }
                }
            }
            ResolvedMetadata::Video(video) => {
                if self.include_dimensions {
                    if let Some(dimensions) = dimensions_descriptor(video.width, video.height) {
                        segments.push(format!("({})", dimensions));
                    }
                }
            }
            ResolvedMetadata::Generic => {}
        }

        segments.push(candidate.file_name());
        sanitize_file_name(&segments.join("_"))
    }
}

fn camera_descriptor(make: Option<&str>, model: Option<&str>) -> Option<String> {
    let make = make.map(str::trim).filter(|s| !s.is_empty());
    let model = model.map(str::trim).filter(|s| !s.is_empty());

    match (make, model) {
        (Some(make), Some(model)) => Some(format!("{} {}", make, model)),
        (Some(only), None) | (None, Some(only)) => Some(only.to_string()),
        (None, None) => None,
    }
}

fn dimensions_descriptor(width: Option<u32>, height: Option<u32>) -> Option<String> {
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some(format!("{}x{}", w, h)),
        _ => None,
    }
}

fn gps_descriptor(gps: &GpsCoordinate) -> String {
    format!("{:.6} {:.6}", gps.latitude, gps.longitude)
}

/// True for characters that are illegal in a file name on any supported
/// host: `<>:"/\|?*` and control characters.
pub fn is_illegal_char(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control()
}

/// Replace every run of illegal characters with a single `-`.
///
/// Runs at either end are dropped rather than replaced. A name that is
/// empty after this (or is `.` / `..`) becomes `_`. The function is total
/// and idempotent.
pub fn sanitize_file_name(input: &str) -> String {
    let sanitized = input
        .split(is_illegal_char)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(REPLACEMENT);

    match sanitized.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => sanitized,
    }
}
