//! Error types for the replication engine.
//!
//! Two numbering spaces are kept apart:
//! - `ExitCode`: fatal startup failures, surfaced as the process exit status.
//! - `DiagnosticCode`: per-field resolution failures recorded in the
//!   diagnostic report and never raised as errors.
//!
//! `SettingsError` and `EngineError` are the `Result` error types of the
//! loader and the job executor respectively.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::ArchiveType;

/// Process exit status for a replication run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    /// Unclassified failure, also used when one or more jobs did not complete.
    UnknownError,
    /// The configured archive type has no writer.
    ModuleLoadFailure,
    /// Settings file missing or empty.
    SettingFileMissing,
    /// Reserved.
    DependencyProviderMissing,
    /// Reserved.
    HostVersionMismatch,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::UnknownError => -1,
            Self::ModuleLoadFailure => -2,
            Self::SettingFileMissing => -3,
            Self::DependencyProviderMissing => -4,
            Self::HostVersionMismatch => -5,
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Per-field failure code recorded by the settings resolver.
///
/// The `-10x` and `-20x` "reserved" codes are part of the published
/// numbering but no resolution rule assigns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagnosticCode {
    SourcePath,
    DestinationPath,
    LogPath,
    LogFileName,
    LogExtension,
    CompressionLevel,
    IncludeExtension,
    ExcludeExtension,
    SourcePathNotFound,
    DestinationPathNotFound,
    LogPathNotFound,
    JobSourcePath,
    JobDestinationPath,
    JobLogPath,
    JobLogFileName,
    JobLogExtension,
    JobCompressionLevel,
    JobIncludeExtension,
    JobExcludeExtension,
    JobSourcePathNotFound,
    JobDestinationPathNotFound,
}

impl DiagnosticCode {
    pub fn code(self) -> i32 {
        match self {
            Self::SourcePath => -101,
            Self::DestinationPath => -102,
            Self::LogPath => -103,
            Self::LogFileName => -104,
            Self::LogExtension => -105,
            Self::CompressionLevel => -106,
            Self::IncludeExtension => -107,
            Self::ExcludeExtension => -108,
            Self::SourcePathNotFound => -111,
            Self::DestinationPathNotFound => -112,
            Self::LogPathNotFound => -113,
            Self::JobSourcePath => -201,
            Self::JobDestinationPath => -202,
            Self::JobLogPath => -203,
            Self::JobLogFileName => -204,
            Self::JobLogExtension => -205,
            Self::JobCompressionLevel => -206,
            Self::JobIncludeExtension => -207,
            Self::JobExcludeExtension => -208,
            Self::JobSourcePathNotFound => -211,
            Self::JobDestinationPathNotFound => -212,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Errors raised while loading the settings document.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings path does not name a readable, non-empty file.
    #[error("settings file missing or empty: {}", path.display())]
    Missing { path: PathBuf },

    /// The document could not be parsed into settings.
    #[error("failed to parse settings file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Two entries in `jobs` share a name.
    #[error("duplicate job name in settings: {name}")]
    DuplicateJob { name: String },
}

impl SettingsError {
    /// Exit status the run ends with when loading fails.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Missing { .. } => ExitCode::SettingFileMissing,
            Self::Parse { .. } | Self::DuplicateJob { .. } => ExitCode::UnknownError,
        }
    }
}

/// Errors that stop a single job from producing its archive or copy.
///
/// File-level failures are recorded on the `FileItem` instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("failed to read file: {}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    #[error("failed to write file: {}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    #[error("failed to enumerate {}: {source}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    #[error("failed to create directory: {}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    #[error("invalid file filter '{pattern}': {source}")]
    InvalidFilter {
        pattern: String,
        source: globset::Error,
    },

    #[error("no archive writer available for {0}")]
    UnsupportedArchive(ArchiveType),

    #[error("archive error in {}: {message}", path.display())]
    Archive { path: PathBuf, message: String },
}
