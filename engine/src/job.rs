//! Job execution module.
//!
//! This module provides the job lifecycle functions:
//! - Planning a job (selecting the files under its source directory)
//! - Running a job (archiving or copying the selected files)
//!
//! A job never returns an error to its caller. Failures are recorded on the
//! file items and in the returned `JobOutcome`, so the run driver can carry
//! on with the remaining jobs.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::archive;
use crate::checksums::{self, ChecksumAlgorithm, ChecksumValue};
use crate::diagnostics::Field;
use crate::error::{DiagnosticCode, EngineError};
use crate::filter::FileFilter;
use crate::fs_ops;
use crate::model::{ArchiveType, FileItem, FileState, GlobalSettings, JobState, ResolvedJob};
use crate::progress::ProgressCallback;
use crate::runlog::JobLog;

/// Run-wide settings every job is executed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSettings {
    pub archive_type: ArchiveType,
    pub archive_ext: String,
    pub checksum: Option<ChecksumAlgorithm>,
}

impl ExecutionSettings {
    pub fn from_global(global: &GlobalSettings) -> Self {
        ExecutionSettings {
            archive_type: global.archive_type,
            archive_ext: global.archive_ext.clone(),
            checksum: global.checksum,
        }
    }
}

/// What happened to one job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job: String,
    pub state: JobState,
    /// The archive file, or the copy directory in copy-only mode.
    pub target: Option<PathBuf>,
    pub files: Vec<FileItem>,
    pub bytes_written: u64,
    /// Digest of the finished archive, when a checksum is configured.
    pub archive_checksum: Option<ChecksumValue>,
    /// Job-level failure that stopped execution.
    pub error: Option<String>,
    /// Fields that prevented a skipped job from running.
    pub skipped_for: Vec<(Field, DiagnosticCode)>,
    pub elapsed: Duration,
    pub log: JobLog,
}

impl JobOutcome {
    fn new(job: &str, state: JobState) -> Self {
        JobOutcome {
            job: job.to_string(),
            state,
            target: None,
            files: Vec::new(),
            bytes_written: 0,
            archive_checksum: None,
            error: None,
            skipped_for: Vec::new(),
            elapsed: Duration::ZERO,
            log: JobLog::new(job),
        }
    }

    /// Outcome for a job whose diagnostics did not all resolve.
    pub fn skipped(job: &str, failures: Vec<(Field, DiagnosticCode)>) -> Self {
        let mut outcome = JobOutcome::new(job, JobState::Skipped);
        for (field, code) in &failures {
            outcome
                .log
                .record(format!("{}{} = {}", job, field.name(), code.code()));
        }
        outcome.log.record("skipped: settings did not resolve");
        outcome.skipped_for = failures;
        outcome
    }

    /// Outcome for a job that stopped before finishing.
    pub fn failed(job: &str, message: impl Into<String>) -> Self {
        let mut outcome = JobOutcome::new(job, JobState::Failed);
        let message = message.into();
        outcome.log.record(format!("failed: {}", message));
        outcome.error = Some(message);
        outcome
    }

    pub fn done_count(&self) -> usize {
        self.count(FileState::Done)
    }

    pub fn failed_count(&self) -> usize {
        self.count(FileState::Failed)
    }

    fn count(&self, state: FileState) -> usize {
        self.files.iter().filter(|f| f.state == state).count()
    }
}

/// Plan a job by selecting the files under its source directory.
///
/// # Errors
/// Returns EngineError if a filter pattern is invalid or the source cannot be read
pub fn plan_job(job: &ResolvedJob) -> Result<Vec<FileItem>, EngineError> {
    let filter = FileFilter::new(&job.include_extension, &job.exclude_extension)?;
    fs_ops::enumerate_files(&job.source_path, &filter)
}

/// Run a job, archiving or copying its files.
///
/// Individual file errors are recorded on the file and do NOT stop the job,
/// but leave it `Failed`. Errors that make the target unusable (the
/// destination cannot be created, the archive cannot be opened or finished)
/// end the job early.
pub fn run_job(
    job: &ResolvedJob,
    settings: &ExecutionSettings,
    progress_callback: Option<&dyn ProgressCallback>,
) -> JobOutcome {
    let started = Instant::now();
    let target = job.target_path(&settings.archive_ext);

    let mut outcome = JobOutcome::new(&job.name, JobState::Completed);
    outcome.target = Some(target.clone());
    outcome.log.record(format!(
        "{} {} -> {}",
        if job.copy_only { "copying" } else { "archiving" },
        job.source_path.display(),
        target.display()
    ));

    match plan_job(job) {
        Ok(files) => outcome.files = files,
        Err(e) => {
            fail_job(&mut outcome, &e);
            return finish(job, outcome, started, progress_callback);
        }
    }
    outcome.log.record(format!("{} files selected", outcome.files.len()));
    for file in outcome.files.iter().filter(|f| f.state == FileState::Failed) {
        let message = file.error_message.as_deref().unwrap_or("unreadable");
        warn!(job = %job.name, file = %file.relative_path.display(), error = message, "entry not readable");
        outcome
            .log
            .record(format!("{}: {}", file.relative_path.display(), message));
    }

    if let Some(callback) = progress_callback {
        callback.on_job_started(job, &outcome.files);
    }

    let result = fs_ops::ensure_dir_exists(&job.destination_path).and_then(|()| {
        if job.copy_only {
            copy_files(job, &target, settings, &mut outcome, progress_callback);
            Ok(())
        } else {
            archive_files(job, &target, settings, &mut outcome, progress_callback)
        }
    });

    match result {
        Err(e) => fail_job(&mut outcome, &e),
        Ok(()) if outcome.failed_count() > 0 => {
            outcome.state = JobState::Failed;
            outcome
                .log
                .record(format!("{} of {} files failed", outcome.failed_count(), outcome.files.len()));
        }
        Ok(()) => {}
    }

    finish(job, outcome, started, progress_callback)
}

fn fail_job(outcome: &mut JobOutcome, error: &EngineError) {
    warn!(job = %outcome.job, error = %error, "job failed");
    outcome.state = JobState::Failed;
    outcome.error = Some(error.to_string());
    outcome.log.record(format!("failed: {}", error));
}

fn finish(
    job: &ResolvedJob,
    mut outcome: JobOutcome,
    started: Instant,
    progress_callback: Option<&dyn ProgressCallback>,
) -> JobOutcome {
    outcome.elapsed = started.elapsed();
    outcome.log.record(format!(
        "{}: {} files, {} bytes in {:.2}s",
        outcome.state,
        outcome.done_count(),
        outcome.bytes_written,
        outcome.elapsed.as_secs_f64()
    ));
    info!(
        job = %job.name,
        state = %outcome.state,
        files = outcome.done_count(),
        bytes = outcome.bytes_written,
        "job finished"
    );

    if let Some(callback) = progress_callback {
        callback.on_job_completed(job, &outcome);
    }
    outcome
}

fn record_file_error(outcome: &mut JobOutcome, index: usize, error: &EngineError) {
    let file = &mut outcome.files[index];
    file.state = FileState::Failed;
    file.error_message = Some(error.to_string());
    warn!(job = %outcome.job, file = %file.relative_path.display(), error = %error, "file failed");
    outcome
        .log
        .record(format!("{}: {}", file.relative_path.display(), error));
}

fn notify_file(
    job: &ResolvedJob,
    outcome: &JobOutcome,
    file_index: usize,
    progress_callback: Option<&dyn ProgressCallback>,
) {
    if let Some(callback) = progress_callback {
        callback.on_file_completed(job, file_index, &outcome.files[file_index]);
    }
}

fn archive_files(
    job: &ResolvedJob,
    target: &Path,
    settings: &ExecutionSettings,
    outcome: &mut JobOutcome,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<(), EngineError> {
    let mut writer = archive::create_writer(settings.archive_type, target, job.compression_level)?;

    for file_index in 0..outcome.files.len() {
        if outcome.files[file_index].state == FileState::Failed {
            notify_file(job, outcome, file_index, progress_callback);
            continue;
        }

        match writer.add_file(&outcome.files[file_index]) {
            Ok(bytes) => {
                let file = &mut outcome.files[file_index];
                file.state = FileState::Done;
                file.bytes_written = bytes;
                outcome.bytes_written += bytes;
            }
            Err(e) => record_file_error(outcome, file_index, &e),
        }

        notify_file(job, outcome, file_index, progress_callback);
    }

    writer.finish()?;
    debug!(job = %job.name, archive = %target.display(), "archive written");

    if let Some(algorithm) = settings.checksum {
        let digest = checksums::compute_file_checksum(target, algorithm)?;
        outcome.log.record(format!("archive checksum {}", digest));
        outcome.archive_checksum = Some(digest);
    }
    Ok(())
}

fn copy_files(
    job: &ResolvedJob,
    target: &Path,
    settings: &ExecutionSettings,
    outcome: &mut JobOutcome,
    progress_callback: Option<&dyn ProgressCallback>,
) {
    for file_index in 0..outcome.files.len() {
        if outcome.files[file_index].state == FileState::Failed {
            notify_file(job, outcome, file_index, progress_callback);
            continue;
        }

        let src_path = outcome.files[file_index].source_path.clone();
        let dst_path = target.join(&outcome.files[file_index].relative_path);

        match fs_ops::copy_file_with_metadata(&src_path, &dst_path) {
            Ok(bytes) => {
                let file = &mut outcome.files[file_index];
                file.state = FileState::Done;
                file.bytes_written = bytes;
                outcome.bytes_written += bytes;

                if let Some(algorithm) = settings.checksum {
                    verify_copied_file(outcome, file_index, &dst_path, algorithm);
                }
            }
            Err(e) => record_file_error(outcome, file_index, &e),
        }

        notify_file(job, outcome, file_index, progress_callback);
    }
}

/// A copy that fails verification counts as a failed file.
fn verify_copied_file(
    outcome: &mut JobOutcome,
    file_index: usize,
    dst_path: &Path,
    algorithm: ChecksumAlgorithm,
) {
    let src_path = outcome.files[file_index].source_path.clone();
    match checksums::verify_copy(&src_path, dst_path, algorithm) {
        Ok(true) => outcome.files[file_index].verified = Some(true),
        Ok(false) => {
            let file = &mut outcome.files[file_index];
            file.verified = Some(false);
            file.state = FileState::Failed;
            file.error_message = Some(format!("{} checksum mismatch after copy", algorithm));
            warn!(job = %outcome.job, file = %file.relative_path.display(), "checksum mismatch");
            outcome
                .log
                .record(format!("{}: {} checksum mismatch", file.relative_path.display(), algorithm));
        }
        Err(e) => record_file_error(outcome, file_index, &e),
    }
}
