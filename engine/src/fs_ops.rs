//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Enumerating a job's source tree through its file filter
//! - Copying files with modification time preservation
//! - Creating directories recursively

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::filter::FileFilter;
use crate::model::{FileItem, FileState};

/// Enumerate the files under `source` that pass `filter`.
///
/// Directories are walked recursively but not returned. Symbolic links are
/// followed; a link back to one of its own ancestors is skipped. Entries are
/// sorted by name within each directory so archives are laid out
/// deterministically.
///
/// An entry or subdirectory that cannot be read is returned as a `Failed`
/// item carrying the error, so the job records it instead of losing it.
///
/// # Errors
/// Returns EngineError if the root cannot be read
pub fn enumerate_files(source: &Path, filter: &FileFilter) -> Result<Vec<FileItem>, EngineError> {
    if !source.is_dir() {
        return Err(EngineError::SourceNotFound {
            path: source.to_path_buf(),
        });
    }

    fn recurse(
        path: &Path,
        rel_path: &Path,
        filter: &FileFilter,
        ancestors: &mut Vec<PathBuf>,
        items: &mut Vec<FileItem>,
    ) -> Result<(), EngineError> {
        let enumeration_failed = |e| EngineError::EnumerationFailed {
            path: path.to_path_buf(),
            source: e,
        };

        let mut entries = fs::read_dir(path)
            .map_err(enumeration_failed)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(enumeration_failed)?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let entry_path = entry.path();
            let rel_full_path = rel_path.join(entry.file_name());

            // fs::metadata follows symlinks, DirEntry::metadata does not
            let metadata = match fs::metadata(&entry_path) {
                Ok(metadata) => metadata,
                Err(e) if filter.matches(&entry_path) => {
                    let error = EngineError::EnumerationFailed {
                        path: entry_path.clone(),
                        source: e,
                    };
                    items.push(failed_item(entry_path, rel_full_path, &error));
                    continue;
                }
                Err(e) => {
                    tracing::debug!(path = %entry_path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };

            if metadata.is_dir() {
                let canonical = fs::canonicalize(&entry_path).unwrap_or_else(|_| entry_path.clone());
                if ancestors.contains(&canonical) {
                    tracing::warn!(path = %entry_path.display(), "skipping directory link loop");
                    continue;
                }

                ancestors.push(canonical);
                let result = recurse(&entry_path, &rel_full_path, filter, ancestors, items);
                ancestors.pop();

                if let Err(e) = result {
                    tracing::warn!(path = %entry_path.display(), error = %e, "cannot read directory");
                    items.push(failed_item(entry_path, rel_full_path, &e));
                }
            } else if filter.matches(&entry_path) {
                items.push(FileItem::new(entry_path, rel_full_path, metadata.len()));
            }
        }
        Ok(())
    }

    let root = fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
    let mut items = Vec::new();
    recurse(source, Path::new(""), filter, &mut vec![root], &mut items)?;
    Ok(items)
}

fn failed_item(path: PathBuf, rel_path: PathBuf, error: &EngineError) -> FileItem {
    let mut item = FileItem::new(path, rel_path, 0);
    item.state = FileState::Failed;
    item.error_message = Some(error.to_string());
    item
}

/// Copy a file from source to destination with metadata preservation.
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// Returns EngineError if the copy fails
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let src_mtime = src_file.metadata().and_then(|m| m.modified()).ok();

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(&mut src_file, &mut dst_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            }
        } else {
            EngineError::ReadError {
                path: src.to_path_buf(),
                source: e,
            }
        }
    })?;
    drop(dst_file);

    if let Some(mtime) = src_mtime {
        let _ = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime));
    }

    Ok(bytes_copied)
}

/// Create `dir` and any missing parents.
///
/// # Errors
/// Returns EngineError if the path exists but is not a directory, or creation fails
pub fn ensure_dir_exists(dir: &Path) -> Result<(), EngineError> {
    match fs::metadata(dir) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: dir.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| EngineError::DirectoryCreationFailed {
                path: dir.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: dir.to_path_buf(),
            source: e,
        }),
    }
}

/// Ensure the parent directory of a path exists, creating it if necessary.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    match path.parent() {
        // Skip if parent is empty path (relative root)
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir_exists(parent),
        _ => Ok(()),
    }
}
