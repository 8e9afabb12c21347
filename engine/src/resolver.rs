//! Settings resolution.
//!
//! Resolution runs in two phases:
//! 1. The global section is resolved into an immutable `GlobalSettings`
//!    snapshot, recording one diagnostic per global field.
//! 2. Each job, in document order, is folded against that snapshot and the
//!    shared `DiagnosticReport`.
//!
//! Job order matters. When a job inherits the global source or destination
//! path and that directory does not exist, the *global* diagnostic is
//! downgraded to `SourcePathNotFound` / `DestinationPathNotFound`, so every
//! later job without its own path fails with `JobSourcePath` /
//! `JobDestinationPath` instead of inheriting.
//!
//! Resolution never stops early: every field of every job ends up resolved
//! or failed in the report.

use std::env;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::diagnostics::{DiagnosticReport, DiagnosticState, Field};
use crate::error::DiagnosticCode;
use crate::model::{ExtensionSet, FieldResult, GlobalSettings, JobSettings, ResolvedJob};
use crate::paths::normalize;
use crate::settings::{RawGlobalSettings, RawJob, SettingsDocument};
use crate::template::{format_run_date, NameContext};

const DEFAULT_LOG_EXTENSION: &str = "log";
const DEFAULT_DELIMITER: &str = "_";

const JOB_FIELDS: [Field; 7] = [
    Field::SourcePath,
    Field::DestinationPath,
    Field::IncludeExtension,
    Field::ExcludeExtension,
    Field::CompressionLevel,
    Field::ArchiveName,
    Field::CopyOnly,
];

/// Answers whether a directory exists.
///
/// Resolution asks once per path check, in job order; tests substitute a
/// probe whose answers change between calls.
pub trait PathProbe {
    fn is_dir(&self, path: &str) -> bool;
}

/// Probe backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl PathProbe for FsProbe {
    fn is_dir(&self, path: &str) -> bool {
        Path::new(path).is_dir()
    }
}

/// Run-wide inputs to resolution.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    /// Date substituted for `%DATE%` and used in log file names.
    pub today: NaiveDate,
    /// Default log directory.
    pub working_dir: PathBuf,
}

impl ResolveContext {
    /// Today's local date and the process working directory.
    pub fn current() -> Self {
        ResolveContext {
            today: Local::now().date_naive(),
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

/// Output of a resolution pass.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub global: GlobalSettings,
    pub jobs: Vec<JobSettings>,
    pub report: DiagnosticReport,
}

impl Resolution {
    /// The executable form of `job`, or the fields that failed to resolve.
    pub fn runnable(&self, job: &JobSettings) -> Result<ResolvedJob, Vec<(Field, DiagnosticCode)>> {
        let failures = self.report.job_failures(&job.name);
        if !failures.is_empty() {
            return Err(failures);
        }
        job.to_resolved().ok_or(failures)
    }
}

/// Codes used for the three failure modes of a path field.
struct PathCodes {
    /// Neither the job nor the global settings provide the path.
    missing: DiagnosticCode,
    /// The job's path does not exist.
    job_not_found: DiagnosticCode,
    /// Replaces the global diagnostic when an inherited path does not exist.
    global_not_found: DiagnosticCode,
    /// Whether a job's own path must already exist.
    check_own: bool,
}

const SOURCE_CODES: PathCodes = PathCodes {
    missing: DiagnosticCode::JobSourcePath,
    job_not_found: DiagnosticCode::JobSourcePathNotFound,
    global_not_found: DiagnosticCode::SourcePathNotFound,
    check_own: true,
};

const DESTINATION_CODES: PathCodes = PathCodes {
    missing: DiagnosticCode::JobDestinationPath,
    job_not_found: DiagnosticCode::JobDestinationPathNotFound,
    global_not_found: DiagnosticCode::DestinationPathNotFound,
    check_own: false,
};

/// Resolve a settings document into a job plan plus diagnostics.
pub fn resolve(
    document: &SettingsDocument,
    context: &ResolveContext,
    probe: &dyn PathProbe,
) -> Resolution {
    let mut resolver = Resolver {
        context,
        probe,
        report: DiagnosticReport::new(),
    };

    let global = resolver.resolve_global(&document.global);
    let jobs: Vec<JobSettings> = document
        .jobs
        .iter()
        .map(|job| resolver.resolve_job(&global, job))
        .collect();

    let report = resolver.report;
    let runnable = jobs
        .iter()
        .filter(|job| report.job_failures(&job.name).is_empty())
        .count();
    info!(jobs = jobs.len(), runnable, "resolved settings");

    Resolution {
        global,
        jobs,
        report,
    }
}

struct Resolver<'a> {
    context: &'a ResolveContext,
    probe: &'a dyn PathProbe,
    report: DiagnosticReport,
}

/// Trimmed value, or `None` when absent or blank.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Resolver<'_> {
    fn record<T>(&mut self, job: Option<&str>, field: Field, result: &FieldResult<T>) {
        let state = match result.failure() {
            Some(code) => DiagnosticState::Failed(code),
            None => DiagnosticState::Resolved,
        };
        debug!(job = job.unwrap_or("<global>"), field = field.name(), origin = result.origin(), "resolved field");
        self.report.set(job, field, state);
    }

    fn mark_resolved(&mut self, field: Field) {
        self.report.set(None, field, DiagnosticState::Resolved);
    }

    fn resolve_global(&mut self, raw: &RawGlobalSettings) -> GlobalSettings {
        let source_path = match present(&raw.source_path) {
            Some(path) => FieldResult::Given(normalize(path)),
            None => FieldResult::Failed(DiagnosticCode::SourcePath),
        };
        self.record(None, Field::SourcePath, &source_path);

        let destination_path = match present(&raw.destination_path) {
            Some(path) => FieldResult::Given(normalize(path)),
            None => FieldResult::Failed(DiagnosticCode::DestinationPath),
        };
        self.record(None, Field::DestinationPath, &destination_path);

        let log_path = match present(&raw.log_path) {
            Some(path) => {
                let path = normalize(path);
                if self.probe.is_dir(&path) {
                    FieldResult::Given(path)
                } else {
                    warn!(path = %path, "log path not found");
                    FieldResult::Failed(DiagnosticCode::LogPathNotFound)
                }
            }
            None => FieldResult::Defaulted(normalize(&self.context.working_dir.to_string_lossy())),
        };
        self.record(None, Field::LogPath, &log_path);

        let log_file_name = present(&raw.log_file_name).map(str::to_string);
        self.mark_resolved(Field::LogFileName);

        let log_extension = present(&raw.log_extension)
            .map(|ext| ext.trim_start_matches('.').to_string())
            .unwrap_or_else(|| DEFAULT_LOG_EXTENSION.to_string());
        self.mark_resolved(Field::LogExtension);

        let compression_level = match raw.compression_level {
            Some(level) => FieldResult::Given(level),
            None => FieldResult::Defaulted(Default::default()),
        };
        self.record(None, Field::CompressionLevel, &compression_level);

        let archive_type = raw.archive_type.unwrap_or_default();
        self.mark_resolved(Field::ArchiveType);

        let file_name_delimiter = match raw.file_name_delimiter.as_deref() {
            Some(delimiter) if !delimiter.trim().is_empty() => delimiter.trim().to_string(),
            Some(delimiter) => delimiter.to_string(),
            None => DEFAULT_DELIMITER.to_string(),
        };
        self.mark_resolved(Field::FileNameDelimiter);

        let include_extension = match &raw.include_extension {
            Some(list) => FieldResult::Given(list.to_set()),
            None => FieldResult::Defaulted(ExtensionSet::default()),
        };
        self.record(None, Field::IncludeExtension, &include_extension);

        let exclude_extension = match &raw.exclude_extension {
            Some(list) => FieldResult::Given(list.to_set()),
            None => FieldResult::Defaulted(ExtensionSet::default()),
        };
        self.record(None, Field::ExcludeExtension, &exclude_extension);

        let copy_only = match raw.copy_only {
            Some(flag) => FieldResult::Given(flag),
            None => FieldResult::Defaulted(false),
        };
        self.record(None, Field::CopyOnly, &copy_only);

        let run_date = format_run_date(self.context.today);
        let full_log_path = match (log_path.value(), &log_file_name) {
            (Some(dir), Some(name)) => Some(PathBuf::from(format!(
                "{}{}{}{}.{}",
                dir, name, file_name_delimiter, run_date, log_extension
            ))),
            _ => None,
        };

        GlobalSettings {
            source_path,
            destination_path,
            log_path,
            log_file_name,
            log_extension,
            compression_level,
            archive_ext: archive_type.archive_ext(),
            archive_type,
            file_name_delimiter,
            include_extension,
            exclude_extension,
            copy_only,
            checksum: raw.checksum,
            full_log_path,
            run_date,
        }
    }

    fn resolve_job(&mut self, global: &GlobalSettings, job: &RawJob) -> JobSettings {
        let name = job.name.as_str();
        let raw = &job.settings;

        for field in JOB_FIELDS {
            self.report.set(Some(name), field, DiagnosticState::Unresolved);
        }

        let source_path = self.resolve_path(
            name,
            Field::SourcePath,
            present(&raw.source_path),
            &global.source_path,
            &SOURCE_CODES,
        );
        let destination_path = self.resolve_path(
            name,
            Field::DestinationPath,
            present(&raw.destination_path),
            &global.destination_path,
            &DESTINATION_CODES,
        );
        let include_extension = self.inherit(
            name,
            Field::IncludeExtension,
            raw.include_extension.as_ref().map(|list| list.to_set()),
            &global.include_extension,
            ExtensionSet::default(),
        );
        let exclude_extension = self.inherit(
            name,
            Field::ExcludeExtension,
            raw.exclude_extension.as_ref().map(|list| list.to_set()),
            &global.exclude_extension,
            ExtensionSet::default(),
        );
        let compression_level = self.inherit(
            name,
            Field::CompressionLevel,
            raw.compression_level,
            &global.compression_level,
            Default::default(),
        );

        let names = NameContext {
            job_name: name,
            delimiter: &global.file_name_delimiter,
            date: &global.run_date,
        };
        let archive_name = match present(&raw.archive_name) {
            Some(template) => FieldResult::Given(names.expand(template)),
            None => FieldResult::Defaulted(names.default_name()),
        };
        self.record(Some(name), Field::ArchiveName, &archive_name);

        let copy_only = self.inherit(name, Field::CopyOnly, raw.copy_only, &global.copy_only, false);

        JobSettings {
            name: name.to_string(),
            source_path,
            destination_path,
            include_extension,
            exclude_extension,
            compression_level,
            archive_name,
            copy_only,
        }
    }

    fn resolve_path(
        &mut self,
        job: &str,
        field: Field,
        own: Option<&str>,
        global: &FieldResult<String>,
        codes: &PathCodes,
    ) -> FieldResult<String> {
        let result = if let Some(path) = own {
            let path = normalize(path);
            if codes.check_own && !self.probe.is_dir(&path) {
                warn!(job, field = field.name(), path = %path, "job path not found");
                FieldResult::Failed(codes.job_not_found)
            } else {
                FieldResult::Given(path)
            }
        } else if self.report.global(field).is_resolved() {
            match global.value() {
                Some(path) if self.probe.is_dir(path) => FieldResult::Inherited(path.clone()),
                Some(path) => {
                    warn!(job, field = field.name(), path = %path, "inherited path not found; marking global path failed");
                    self.report
                        .set(None, field, DiagnosticState::Failed(codes.global_not_found));
                    FieldResult::Failed(codes.job_not_found)
                }
                None => FieldResult::Failed(codes.missing),
            }
        } else {
            FieldResult::Failed(codes.missing)
        };

        self.record(Some(job), field, &result);
        result
    }

    fn inherit<T: Clone>(
        &mut self,
        job: &str,
        field: Field,
        own: Option<T>,
        global: &FieldResult<T>,
        default: T,
    ) -> FieldResult<T> {
        let result = match own {
            Some(value) => FieldResult::Given(value),
            None if self.report.global(field).is_resolved() => match global {
                FieldResult::Given(value) | FieldResult::Inherited(value) => {
                    FieldResult::Inherited(value.clone())
                }
                FieldResult::Defaulted(value) => FieldResult::Defaulted(value.clone()),
                FieldResult::Failed(_) => FieldResult::Defaulted(default),
            },
            None => FieldResult::Defaulted(default),
        };

        self.record(Some(job), field, &result);
        result
    }
}
