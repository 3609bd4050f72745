//! EXIF-backed photo resolver and the date parser shared by resolvers.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use exif::{Exif, In, Tag, Value};
use tracing::trace;

use super::{
    GpsCoordinate, MediaKind, MetadataError, MetadataResolver, PhotoMetadata, ResolvedMetadata,
};

const DATETIME_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S%.f",
    "%Y:%m:%d %H:%M:%S",
    "%Y:%m:%d %H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%a %b %d %H:%M:%S %Y",
];

const DATE_FORMATS: &[&str] = &["%Y:%m:%d", "%Y-%m-%d", "%Y%m%d"];

/// Parse the date strings found in photo and video metadata.
///
/// Accepts the EXIF form (`2025:11:19 12:07:21`), ISO 8601 with or without
/// an offset (the offset is dropped, wall time kept), dotted dates, ctime
/// style strings and date-only values (midnight). Blank or zeroed values
/// such as `0000:00:00 00:00:00` yield `None`.
pub fn parse_datetime(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim().trim_end_matches('\0').trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.naive_local());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
            return Some(dt);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(input, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Resolver that reads EXIF tags from photos with `kamadak-exif`.
///
/// Videos resolve to an empty `Video` variant since no container parser is
/// wired in; other files resolve to `Generic`. A photo without any EXIF
/// block is not an error: it resolves to an empty `Photo` variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifMetadataResolver;

impl MetadataResolver for ExifMetadataResolver {
    fn resolve(&self, path: &Path) -> Result<ResolvedMetadata, MetadataError> {
        let kind = MediaKind::from_path(path);
        let file = File::open(path).map_err(|e| MetadataError::from_io(path, e))?;
        if kind != MediaKind::Photo {
            return Ok(ResolvedMetadata::empty(kind));
        }

        let mut reader = BufReader::new(file);
        match exif::Reader::new().read_from_container(&mut reader) {
            Ok(exif) => Ok(ResolvedMetadata::Photo(photo_metadata(&exif))),
            Err(
                exif::Error::NotFound(_)
                | exif::Error::NotSupported(_)
                | exif::Error::BlankValue(_),
            ) => {
                trace!(path = %path.display(), "no EXIF data");
                Ok(ResolvedMetadata::Photo(PhotoMetadata::default()))
            }
            Err(exif::Error::Io(e)) => Err(MetadataError::from_io(path, e)),
            Err(e) => Err(MetadataError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }
}

fn photo_metadata(exif: &Exif) -> PhotoMetadata {
    PhotoMetadata {
        taken_at: ascii_tag(exif, Tag::DateTimeOriginal).and_then(|s| parse_datetime(&s)),
        modified_at: ascii_tag(exif, Tag::DateTimeDigitized).and_then(|s| parse_datetime(&s)),
        camera_make: ascii_tag(exif, Tag::Make),
        camera_model: ascii_tag(exif, Tag::Model),
        width: uint_tag(exif, Tag::PixelXDimension).or_else(|| uint_tag(exif, Tag::ImageWidth)),
        height: uint_tag(exif, Tag::PixelYDimension).or_else(|| uint_tag(exif, Tag::ImageLength)),
        gps: gps_coordinate(exif),
    }
}

fn ascii_tag(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) => parts
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).trim_end_matches('\0').trim().to_string())
            .find(|s| !s.is_empty()),
        _ => None,
    }
}

fn uint_tag(exif: &Exif, tag: Tag) -> Option<u32> {
    exif.get_field(tag, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .filter(|v| *v > 0)
}

fn gps_coordinate(exif: &Exif) -> Option<GpsCoordinate> {
    let latitude = dms_degrees(exif, Tag::GPSLatitude)?;
    let longitude = dms_degrees(exif, Tag::GPSLongitude)?;

    let south = ascii_tag(exif, Tag::GPSLatitudeRef).is_some_and(|r| r.eq_ignore_ascii_case("S"));
    let west = ascii_tag(exif, Tag::GPSLongitudeRef).is_some_and(|r| r.eq_ignore_ascii_case("W"));

    Some(GpsCoordinate {
        latitude: if south { -latitude } else { latitude },
        longitude: if west { -longitude } else { longitude },
    })
}

// Degrees, minutes, seconds as three rationals.
fn dms_degrees(exif: &Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Rational(parts) if parts.len() >= 3 => {
            let degrees = parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0;
            degrees.is_finite().then_some(degrees)
        }
        _ => None,
    }
}
