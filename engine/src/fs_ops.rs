//! Filesystem operations module.
//!
//! This module provides the low-level operations a worker performs after
//! the target path is known:
//! - Creating destination directories
//! - Picking a collision-free destination name
//! - Copying files with metadata preservation
//! - Moving files, across volumes if needed

use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cancel::CancellationToken;
use crate::error::EngineError;
use crate::model::Mode;

const COPY_CHUNK_SIZE: usize = 256 * 1024;

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Arguments
/// * `path` - Path for which the parent directory should be created
///
/// # Errors
/// Returns EngineError if directory creation fails
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        // Skip if parent is empty path (Windows root or relative root)
        if parent.as_os_str().is_empty() {
            return Ok(());
        }

        match fs::metadata(parent) {
            Ok(metadata) => {
                if metadata.is_dir() {
                    Ok(())
                } else {
                    Err(EngineError::DirectoryCreationFailed {
                        path: parent.to_path_buf(),
                        source: io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "Parent path exists but is not a directory",
                        ),
                    })
                }
            }
            // Concurrent workers may race here; create_dir_all tolerates that
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })
            }
            Err(e) => Err(EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            }),
        }
    } else {
        Ok(())
    }
}

/// Return a destination path that does not exist yet.
///
/// Creates the parent directory first. If `path` is taken, tries
/// `stem (1).ext`, `stem (2).ext` and so on, returning the first free name.
/// Another writer may claim the name between this check and the transfer;
/// the transfer's overwrite policy decides what happens then.
///
/// # Errors
/// Returns EngineError if the parent cannot be created or a name cannot be
/// checked.
pub fn make_unique_path(path: &Path) -> Result<PathBuf, EngineError> {
    ensure_parent_dir_exists(path)?;

    if !path_exists(path)? {
        return Ok(path.to_path_buf());
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path.file_stem().map(OsString::from).unwrap_or_default();
    let extension = path.extension();

    let mut counter: u64 = 1;
    loop {
        let mut name = stem.clone();
        name.push(format!(" ({})", counter));
        if let Some(extension) = extension {
            name.push(".");
            name.push(extension);
        }

        let candidate = parent.join(name);
        if !path_exists(&candidate)? {
            return Ok(candidate);
        }
        counter += 1;
    }
}

// Dangling symlinks count as taken.
fn path_exists(path: &Path) -> Result<bool, EngineError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(EngineError::WriteError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Copy or move `src` to `dst`.
///
/// With `overwrite` false an existing `dst` fails the file with
/// `DestinationExists`; nothing is replaced. Returns the number of bytes
/// written, or the file size for a move that was a plain rename.
pub fn transfer_file(
    src: &Path,
    dst: &Path,
    mode: Mode,
    overwrite: bool,
    cancel: &CancellationToken,
) -> Result<u64, EngineError> {
    cancel.check(src)?;

    if !overwrite && path_exists(dst)? {
        return Err(EngineError::DestinationExists {
            path: dst.to_path_buf(),
        });
    }

    match mode {
        Mode::Copy => copy_file_with_metadata(src, dst, overwrite, cancel),
        Mode::Move => move_file(src, dst, overwrite, cancel),
    }
}

/// Copy a file from source to destination with metadata preservation.
///
/// The copy is chunked and checks `cancel` between chunks. A partially
/// written destination is removed when the copy fails or is cancelled.
///
/// # Arguments
/// * `src` - Source file path
/// * `dst` - Destination file path
/// * `overwrite` - Replace an existing destination instead of failing
/// * `cancel` - Token checked between chunks
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// Returns EngineError if the copy fails
pub fn copy_file_with_metadata(
    src: &Path,
    dst: &Path,
    overwrite: bool,
    cancel: &CancellationToken,
) -> Result<u64, EngineError> {
    // Ensure parent directory exists
    ensure_parent_dir_exists(dst)?;

    // Open source file
    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    // Get source metadata for modification time
    let src_metadata = src_file.metadata().map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;
    let src_mtime = src_metadata.modified().ok();

    // Exclusive create closes the window left by the existence check
    let mut open = fs::OpenOptions::new();
    open.write(true);
    if overwrite {
        open.create(true).truncate(true);
    } else {
        open.create_new(true);
    }
    let mut dst_file = open.open(dst).map_err(|e| {
        if e.kind() == io::ErrorKind::AlreadyExists {
            EngineError::DestinationExists {
                path: dst.to_path_buf(),
            }
        } else {
            EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            }
        }
    })?;

    let copied = copy_chunks(&mut src_file, &mut dst_file, src, dst, cancel);
    drop(dst_file);

    let bytes_copied = match copied {
        Ok(bytes) => bytes,
        Err(e) => {
            if let Err(remove_err) = fs::remove_file(dst) {
                debug!(path = %dst.display(), error = %remove_err, "could not remove partial file");
            }
            return Err(e);
        }
    };

    // Preserve modification time if available
    if let Some(mtime) = src_mtime {
        if let Err(e) = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime)) {
            debug!(path = %dst.display(), error = %e, "could not preserve modification time");
        }
    }

    Ok(bytes_copied)
}

fn copy_chunks(
    reader: &mut fs::File,
    writer: &mut fs::File,
    src: &Path,
    dst: &Path,
    cancel: &CancellationToken,
) -> Result<u64, EngineError> {
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    let mut total: u64 = 0;

    loop {
        cancel.check(src)?;

        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(EngineError::ReadError {
                    path: src.to_path_buf(),
                    source: e,
                })
            }
        };

        writer
            .write_all(&buffer[..n])
            .map_err(|e| EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            })?;
        total += n as u64;
    }

    writer.flush().map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    Ok(total)
}

fn move_file(
    src: &Path,
    dst: &Path,
    overwrite: bool,
    cancel: &CancellationToken,
) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;

    let size = fs::metadata(src)
        .map_err(|e| EngineError::ReadError {
            path: src.to_path_buf(),
            source: e,
        })?
        .len();

    match fs::rename(src, dst) {
        Ok(()) => Ok(size),
        Err(e) if is_cross_device(&e) => {
            debug!(src = %src.display(), dst = %dst.display(), "cross-volume move, copying");
            copy_then_remove(src, dst, overwrite, cancel)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(EngineError::ReadError {
            path: src.to_path_buf(),
            source: e,
        }),
        Err(e) => Err(EngineError::WriteError {
            path: dst.to_path_buf(),
            source: e,
        }),
    }
}

fn copy_then_remove(
    src: &Path,
    dst: &Path,
    overwrite: bool,
    cancel: &CancellationToken,
) -> Result<u64, EngineError> {
    let bytes = copy_file_with_metadata(src, dst, overwrite, cancel)?;
    fs::remove_file(src).map_err(|e| EngineError::SourceRemovalFailed {
        path: src.to_path_buf(),
        source: e,
    })?;
    Ok(bytes)
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    const EXDEV: i32 = 18;
    err.raw_os_error() == Some(EXDEV)
}

#[cfg(windows)]
fn is_cross_device(err: &io::Error) -> bool {
    const ERROR_NOT_SAME_DEVICE: i32 = 17;
    err.raw_os_error() == Some(ERROR_NOT_SAME_DEVICE)
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_err: &io::Error) -> bool {
    false
}
