//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which decouples job
//! execution from how progress is shown. The CLI prints to stderr; tests
//! record the calls.

use crate::job::JobOutcome;
use crate::model::{FileItem, ResolvedJob};

/// Trait for receiving progress updates while jobs execute.
///
/// Methods are called synchronously from the thread running the job. When
/// jobs run in parallel, calls for different jobs may interleave.
pub trait ProgressCallback: Send + Sync {
    /// Called after the job's files have been selected, before any are written.
    fn on_job_started(&self, job: &ResolvedJob, files: &[FileItem]);

    /// Called when a file has been archived or copied, or has failed.
    fn on_file_completed(&self, job: &ResolvedJob, file_index: usize, file: &FileItem);

    /// Called once the job has finished, successfully or not.
    fn on_job_completed(&self, job: &ResolvedJob, outcome: &JobOutcome);
}
