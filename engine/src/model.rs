//! Core data model for replication jobs.
//!
//! This module defines:
//! - Settings enums: CompressionLevel, ArchiveType
//! - ExtensionSet: normalized include/exclude patterns
//! - FieldResult: the per-field outcome of settings resolution
//! - GlobalSettings / JobSettings: resolved settings as produced by the resolver
//! - ResolvedJob: a job whose every field resolved, ready for the executor
//! - FileItem, FileState, JobState: execution-time tracking

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::checksums::ChecksumAlgorithm;
use crate::error::DiagnosticCode;

/// Compression level applied by the archive writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum CompressionLevel {
    #[default]
    None,
    Fast,
    Low,
    Normal,
    High,
    Ultra,
}

impl CompressionLevel {
    /// Numeric level on the 0-9 deflate scale.
    pub fn level(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Fast => 1,
            Self::Low => 3,
            Self::Normal => 5,
            Self::High => 7,
            Self::Ultra => 9,
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for CompressionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "fast" => Ok(Self::Fast),
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "ultra" => Ok(Self::Ultra),
            _ => Err(format!("unknown compression level '{}'", s)),
        }
    }
}

impl TryFrom<String> for CompressionLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Archive container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum ArchiveType {
    /// Let the tool pick; written as Zip.
    Auto,
    BZip2,
    GZip,
    SevenZip,
    Tar,
    XZ,
    #[default]
    Zip,
}

impl ArchiveType {
    /// File extension for archives of this type, without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Auto | Self::Zip => "zip",
            Self::BZip2 => "tar.bz2",
            Self::GZip => "tar.gz",
            Self::SevenZip => "7z",
            Self::Tar => "tar",
            Self::XZ => "tar.xz",
        }
    }

    /// Extension including the leading dot, as appended to archive names.
    pub fn archive_ext(self) -> String {
        format!(".{}", self.extension())
    }
}

impl fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for ArchiveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "bzip2" => Ok(Self::BZip2),
            "gzip" => Ok(Self::GZip),
            "sevenzip" | "7z" => Ok(Self::SevenZip),
            "tar" => Ok(Self::Tar),
            "xz" => Ok(Self::XZ),
            "zip" => Ok(Self::Zip),
            _ => Err(format!("unknown archive type '{}'", s)),
        }
    }
}

impl TryFrom<String> for ArchiveType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A set of trimmed file extension patterns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtensionSet(BTreeSet<String>);

impl ExtensionSet {
    /// Split a comma-separated list, trimming each entry and dropping blanks.
    pub fn parse(list: &str) -> Self {
        Self::from_items(list.split(','))
    }

    pub fn from_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ExtensionSet(
            items
                .into_iter()
                .map(|item| item.as_ref().trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.0.contains(pattern)
    }
}

impl fmt::Display for ExtensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{}", joined.join(", "))
    }
}

/// Outcome of resolving one settings field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldResult<T> {
    /// Set explicitly where it was read.
    Given(T),
    /// Copied from the global settings.
    Inherited(T),
    /// Filled with a built-in default.
    Defaulted(T),
    /// Could not be resolved.
    Failed(DiagnosticCode),
}

impl<T> FieldResult<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Given(v) | Self::Inherited(v) | Self::Defaulted(v) => Some(v),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<DiagnosticCode> {
        match self {
            Self::Failed(code) => Some(*code),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Self::Defaulted(_))
    }

    /// Short label describing where the value came from.
    pub fn origin(&self) -> &'static str {
        match self {
            Self::Given(_) => "given",
            Self::Inherited(_) => "inherited",
            Self::Defaulted(_) => "default",
            Self::Failed(_) => "failed",
        }
    }
}

impl<T: fmt::Display> fmt::Display for FieldResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(code) => write!(f, "<{}>", code),
            other => match other.value() {
                Some(v) => write!(f, "{} ({})", v, other.origin()),
                None => Ok(()),
            },
        }
    }
}

/// The immutable global settings snapshot built by the resolver.
///
/// Path fields hold normalized strings that end with a separator. The
/// diagnostic report, not this snapshot, is authoritative for whether a
/// global path is still usable after jobs have been resolved.
#[derive(Debug, Clone)]
pub struct GlobalSettings {
    pub source_path: FieldResult<String>,
    pub destination_path: FieldResult<String>,
    pub log_path: FieldResult<String>,
    pub log_file_name: Option<String>,
    pub log_extension: String,
    pub compression_level: FieldResult<CompressionLevel>,
    pub archive_type: ArchiveType,
    /// "." followed by the archive type's extension.
    pub archive_ext: String,
    pub file_name_delimiter: String,
    pub include_extension: FieldResult<ExtensionSet>,
    pub exclude_extension: FieldResult<ExtensionSet>,
    pub copy_only: FieldResult<bool>,
    pub checksum: Option<ChecksumAlgorithm>,
    /// Set only when `log_file_name` is present and the log path resolved.
    pub full_log_path: Option<PathBuf>,
    /// Run date as substituted for `%DATE%`.
    pub run_date: String,
}

/// One job after resolution; failed fields carry their diagnostic code.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub name: String,
    pub source_path: FieldResult<String>,
    pub destination_path: FieldResult<String>,
    pub include_extension: FieldResult<ExtensionSet>,
    pub exclude_extension: FieldResult<ExtensionSet>,
    pub compression_level: FieldResult<CompressionLevel>,
    pub archive_name: FieldResult<String>,
    pub copy_only: FieldResult<bool>,
}

impl JobSettings {
    /// Build the executable form if every field resolved.
    pub fn to_resolved(&self) -> Option<ResolvedJob> {
        Some(ResolvedJob {
            name: self.name.clone(),
            source_path: PathBuf::from(self.source_path.value()?),
            destination_path: PathBuf::from(self.destination_path.value()?),
            include_extension: self.include_extension.value()?.clone(),
            exclude_extension: self.exclude_extension.value()?.clone(),
            compression_level: *self.compression_level.value()?,
            archive_name: self.archive_name.value()?.clone(),
            copy_only: *self.copy_only.value()?,
        })
    }
}

/// A job with every field resolved, as handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedJob {
    pub name: String,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub include_extension: ExtensionSet,
    pub exclude_extension: ExtensionSet,
    pub compression_level: CompressionLevel,
    pub archive_name: String,
    pub copy_only: bool,
}

impl ResolvedJob {
    /// Where this job writes: the archive file, or the copy directory in copy-only mode.
    pub fn target_path(&self, archive_ext: &str) -> PathBuf {
        if self.copy_only {
            self.destination_path.join(&self.archive_name)
        } else {
            self.destination_path
                .join(format!("{}{}", self.archive_name, archive_ext))
        }
    }
}

/// A single source file selected for a job.
#[derive(Debug, Clone)]
pub struct FileItem {
    /// Full source path
    pub source_path: PathBuf,

    /// Path relative to the job's source directory
    pub relative_path: PathBuf,

    /// File size in bytes
    pub file_size: u64,

    /// Current state of this file
    pub state: FileState,

    /// Bytes written to the archive or copy target
    pub bytes_written: u64,

    /// Human-readable error message
    pub error_message: Option<String>,

    /// Result of checksum verification for raw copies, if performed
    pub verified: Option<bool>,
}

impl FileItem {
    pub fn new(source_path: PathBuf, relative_path: PathBuf, file_size: u64) -> Self {
        FileItem {
            source_path,
            relative_path,
            file_size,
            state: FileState::Pending,
            bytes_written: 0,
            error_message: None,
            verified: None,
        }
    }

    /// Entry name inside an archive: relative path with `/` separators.
    pub fn entry_name(&self) -> String {
        entry_name(&self.relative_path)
    }
}

fn entry_name(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// The state of an individual file within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Not yet processed
    Pending,
    /// Written to the archive or copied
    Done,
    /// Error occurred; file not written
    Failed,
}

/// The state of a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Diagnostics prevented execution
    Skipped,
    /// Every selected file was written
    Completed,
    /// The job could not finish or some files failed
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_set_trims_and_drops_blanks() {
        let set = ExtensionSet::parse(" *.bak, .trn ,, log ");
        assert_eq!(set.len(), 3);
        assert!(set.contains("*.bak"));
        assert!(set.contains(".trn"));
        assert!(set.contains("log"));
    }

    #[test]
    fn test_extension_set_from_empty_string_is_empty() {
        assert!(ExtensionSet::parse("").is_empty());
        assert!(ExtensionSet::parse(" , ").is_empty());
    }

    #[test]
    fn test_enum_parsing_is_case_insensitive() {
        assert_eq!("ULTRA".parse::<CompressionLevel>(), Ok(CompressionLevel::Ultra));
        assert_eq!("gzip".parse::<ArchiveType>(), Ok(ArchiveType::GZip));
        assert!("Turbo".parse::<CompressionLevel>().is_err());
    }

    #[test]
    fn test_archive_ext_defaults() {
        assert_eq!(ArchiveType::default(), ArchiveType::Zip);
        assert_eq!(ArchiveType::Zip.archive_ext(), ".zip");
        assert_eq!(ArchiveType::Auto.archive_ext(), ".zip");
        assert_eq!(ArchiveType::GZip.archive_ext(), ".tar.gz");
        assert_eq!(CompressionLevel::default(), CompressionLevel::None);
    }

    #[test]
    fn test_field_result_accessors() {
        let given: FieldResult<u8> = FieldResult::Given(3);
        assert_eq!(given.value(), Some(&3));
        assert!(given.is_resolved());
        assert_eq!(given.origin(), "given");

        let failed: FieldResult<u8> = FieldResult::Failed(DiagnosticCode::JobSourcePath);
        assert_eq!(failed.value(), None);
        assert_eq!(failed.failure(), Some(DiagnosticCode::JobSourcePath));
    }

    #[test]
    fn test_target_path_for_archive_and_copy() {
        let mut job = ResolvedJob {
            name: "SQL".to_string(),
            source_path: PathBuf::from("/src/"),
            destination_path: PathBuf::from("/dst/"),
            include_extension: ExtensionSet::default(),
            exclude_extension: ExtensionSet::default(),
            compression_level: CompressionLevel::None,
            archive_name: "SQL_2023-Nov-01".to_string(),
            copy_only: false,
        };
        assert_eq!(job.target_path(".zip"), PathBuf::from("/dst/SQL_2023-Nov-01.zip"));

        job.copy_only = true;
        assert_eq!(job.target_path(".zip"), PathBuf::from("/dst/SQL_2023-Nov-01"));
    }

    #[test]
    fn test_entry_name_uses_forward_slashes() {
        let item = FileItem::new(
            PathBuf::from("/src/a/b.txt"),
            Path::new("a").join("b.txt"),
            1,
        );
        assert_eq!(item.entry_name(), "a/b.txt");
    }
}
