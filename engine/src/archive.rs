//! Archive writers.
//!
//! Each supported archive type has a writer that receives files one at a
//! time, so the executor can record per-file outcomes as it goes:
//! - Zip (and Auto): deflate, or stored when the compression level is None
//! - Tar: uncompressed tarball
//! - GZip: gzip-compressed tarball
//!
//! BZip2, XZ and SevenZip have no writer.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::EngineError;
use crate::model::{ArchiveType, CompressionLevel, FileItem};

/// Receives files for one archive.
pub trait ArchiveWriter {
    /// Append one file, returning the number of source bytes written.
    fn add_file(&mut self, item: &FileItem) -> Result<u64, EngineError>;

    /// Complete the archive and flush it to disk.
    fn finish(self: Box<Self>) -> Result<(), EngineError>;
}

/// Whether `archive_type` has a writer.
pub fn is_supported(archive_type: ArchiveType) -> bool {
    matches!(
        archive_type,
        ArchiveType::Auto | ArchiveType::Zip | ArchiveType::Tar | ArchiveType::GZip
    )
}

/// Create the archive file at `path` and return its writer.
pub fn create_writer(
    archive_type: ArchiveType,
    path: &Path,
    level: CompressionLevel,
) -> Result<Box<dyn ArchiveWriter + Send>, EngineError> {
    if !is_supported(archive_type) {
        return Err(EngineError::UnsupportedArchive(archive_type));
    }

    let file = File::create(path).map_err(|e| EngineError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let writer: Box<dyn ArchiveWriter + Send> = match archive_type {
        ArchiveType::Tar => Box::new(TarWriter::new(path, file)),
        ArchiveType::GZip => {
            let encoder = GzEncoder::new(file, Compression::new(u32::from(level.level())));
            Box::new(TarWriter::new(path, encoder))
        }
        _ => Box::new(ZipArchiveWriter::new(path, file, level)),
    };
    Ok(writer)
}

fn archive_error(path: &Path, error: impl std::fmt::Display) -> EngineError {
    EngineError::Archive {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}

fn open_source(item: &FileItem) -> Result<File, EngineError> {
    File::open(&item.source_path).map_err(|e| EngineError::ReadError {
        path: item.source_path.clone(),
        source: e,
    })
}

struct ZipArchiveWriter {
    path: PathBuf,
    zip: ZipWriter<File>,
    options: SimpleFileOptions,
}

impl ZipArchiveWriter {
    fn new(path: &Path, file: File, level: CompressionLevel) -> Self {
        let options = match level {
            CompressionLevel::None => {
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
            }
            other => SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(other.level().into())),
        };

        ZipArchiveWriter {
            path: path.to_path_buf(),
            zip: ZipWriter::new(file),
            options,
        }
    }
}

/// Entries of 4 GiB or more need ZIP64 headers.
fn needs_zip64(size: u64) -> bool {
    size >= u64::from(u32::MAX)
}

impl ArchiveWriter for ZipArchiveWriter {
    fn add_file(&mut self, item: &FileItem) -> Result<u64, EngineError> {
        let mut source = open_source(item)?;
        let size = source.metadata().map_or(item.file_size, |m| m.len());
        let options = self.options.large_file(needs_zip64(size));

        self.zip
            .start_file(item.entry_name(), options)
            .map_err(|e| archive_error(&self.path, e))?;

        match io::copy(&mut source, &mut self.zip) {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                // Drop the partial entry so the archive only lists files that made it
                if let Err(abort) = self.zip.abort_file() {
                    tracing::warn!(archive = %self.path.display(), error = %abort, "failed to drop partial entry");
                }
                Err(EngineError::ReadError {
                    path: item.source_path.clone(),
                    source: e,
                })
            }
        }
    }

    fn finish(self: Box<Self>) -> Result<(), EngineError> {
        let ZipArchiveWriter { path, zip, .. } = *self;
        let file = zip.finish().map_err(|e| archive_error(&path, e))?;
        file.sync_all().map_err(|e| EngineError::WriteError { path, source: e })
    }
}

/// A tar output stream that needs finalizing after the last entry.
trait TarSink: Write {
    fn close(self) -> io::Result<()>;
}

impl TarSink for File {
    fn close(self) -> io::Result<()> {
        self.sync_all()
    }
}

impl TarSink for GzEncoder<File> {
    fn close(self) -> io::Result<()> {
        self.finish()?.sync_all()
    }
}

struct TarWriter<W: TarSink> {
    path: PathBuf,
    builder: tar::Builder<W>,
}

impl<W: TarSink> TarWriter<W> {
    fn new(path: &Path, sink: W) -> Self {
        let mut builder = tar::Builder::new(sink);
        builder.follow_symlinks(true);
        TarWriter {
            path: path.to_path_buf(),
            builder,
        }
    }
}

impl<W: TarSink> ArchiveWriter for TarWriter<W> {
    fn add_file(&mut self, item: &FileItem) -> Result<u64, EngineError> {
        let mut source = open_source(item)?;
        let size = source
            .metadata()
            .map_err(|e| EngineError::ReadError {
                path: item.source_path.clone(),
                source: e,
            })?
            .len();
        self.builder
            .append_file(item.entry_name(), &mut source)
            .map_err(|e| archive_error(&self.path, e))?;
        Ok(size)
    }

    fn finish(self: Box<Self>) -> Result<(), EngineError> {
        let TarWriter { path, builder } = *self;
        let sink = builder
            .into_inner()
            .map_err(|e| archive_error(&path, e))?;
        sink.close()
            .map_err(|e| EngineError::WriteError { path, source: e })
    }
}
