//! Run log artifact.
//!
//! Each job writes to its own `JobLog` while it executes. The run driver
//! appends the buffers to the `RunLog` in document order once every job has
//! finished, so the combined log is deterministic even when jobs run in
//! parallel. Sections appear in this order:
//! 1. configuration echo
//! 2. diagnostics
//! 3. archive paths
//! 4. per-job execution logs

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use uuid::Uuid;

use crate::diagnostics::DiagnosticReport;
use crate::fs_ops::ensure_parent_dir_exists;
use crate::model::{GlobalSettings, JobSettings};

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Log lines for one job.
#[derive(Debug, Clone)]
pub struct JobLog {
    job: String,
    lines: Vec<String>,
}

impl JobLog {
    pub fn new(job: &str) -> Self {
        JobLog {
            job: job.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    /// Append a timestamped line.
    pub fn record(&mut self, message: impl AsRef<str>) {
        self.lines
            .push(format!("{}  [{}] {}", timestamp(), self.job, message.as_ref()));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// The combined log for one replication run.
#[derive(Debug, Clone)]
pub struct RunLog {
    run_id: Uuid,
    lines: Vec<String>,
    in_jobs_section: bool,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLog {
    pub fn new() -> Self {
        let run_id = Uuid::new_v4();
        RunLog {
            run_id,
            lines: vec![format!("{}  Replication run {}", timestamp(), run_id)],
            in_jobs_section: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    fn section(&mut self, title: &str) {
        self.lines.push(String::new());
        self.lines.push(format!("== {} ==", title));
    }

    /// Echo the resolved configuration.
    pub fn record_settings(&mut self, global: &GlobalSettings, jobs: &[JobSettings]) {
        self.section("Configuration");
        let entries = [
            ("SourcePath", global.source_path.to_string()),
            ("DestinationPath", global.destination_path.to_string()),
            ("LogPath", global.log_path.to_string()),
            (
                "LogFileName",
                global.log_file_name.clone().unwrap_or_default(),
            ),
            ("LogExtension", global.log_extension.clone()),
            ("CompressionLevel", global.compression_level.to_string()),
            ("ArchiveType", global.archive_type.to_string()),
            ("ArchiveExt", global.archive_ext.clone()),
            ("FileNameDelimiter", global.file_name_delimiter.clone()),
            ("IncludeExtension", global.include_extension.to_string()),
            ("ExcludeExtension", global.exclude_extension.to_string()),
            ("CopyOnly", global.copy_only.to_string()),
            (
                "Checksum",
                global.checksum.map(|c| c.to_string()).unwrap_or_default(),
            ),
        ];
        for (key, value) in entries {
            self.lines.push(format!("{} = {}", key, value));
        }

        for job in jobs {
            self.lines.push(format!("[{}]", job.name));
            self.lines.push(format!("  SourcePath = {}", job.source_path));
            self.lines.push(format!("  DestinationPath = {}", job.destination_path));
            self.lines.push(format!("  IncludeExtension = {}", job.include_extension));
            self.lines.push(format!("  ExcludeExtension = {}", job.exclude_extension));
            self.lines.push(format!("  CompressionLevel = {}", job.compression_level));
            self.lines.push(format!("  ArchiveName = {}", job.archive_name));
            self.lines.push(format!("  CopyOnly = {}", job.copy_only));
        }
    }

    /// Record every diagnostic entry as `key = true` or `key = <code>`.
    pub fn record_diagnostics(&mut self, report: &DiagnosticReport) {
        self.section("Diagnostics");
        for entry in report.entries() {
            self.lines.push(format!("{} = {}", entry.key(), entry.state));
        }
    }

    /// Record the target each job will write to.
    pub fn record_targets<'a, I>(&mut self, targets: I)
    where
        I: IntoIterator<Item = (&'a str, &'a Path)>,
    {
        self.section("Archive paths");
        for (job, target) in targets {
            self.lines.push(format!("{} -> {}", job, target.display()));
        }
    }

    /// Append a job's buffered lines.
    pub fn append_job_log(&mut self, log: &JobLog) {
        if !self.in_jobs_section {
            self.section("Jobs");
            self.in_jobs_section = true;
        }
        self.lines.extend_from_slice(&log.lines);
    }

    /// Append the log to `path`, creating the file and parent directories.
    ///
    /// Runs on the same day share a log file; each starts at its own run id
    /// header.
    pub fn write_to(&self, path: &Path) -> io::Result<PathBuf> {
        ensure_parent_dir_exists(path)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        let has_earlier_runs = file.metadata()?.len() > 0;

        let mut file = io::BufWriter::new(file);
        if has_earlier_runs {
            writeln!(file)?;
        }
        for line in &self.lines {
            writeln!(file, "{}", line)?;
        }
        file.flush()?;
        Ok(path.to_path_buf())
    }
}
