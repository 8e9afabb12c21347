//! Run driver.
//!
//! Takes a resolution, checks that an archive writer exists, records the
//! configuration and diagnostics, executes every runnable job and writes the
//! run log. Jobs whose settings did not resolve are skipped without stopping
//! the run.

use std::path::PathBuf;
use std::thread;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::archive;
use crate::diagnostics::Field;
use crate::error::{DiagnosticCode, ExitCode};
use crate::job::{self, ExecutionSettings, JobOutcome};
use crate::model::{JobState, ResolvedJob};
use crate::progress::ProgressCallback;
use crate::resolver::Resolution;
use crate::runlog::RunLog;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Execute jobs on scoped threads.
    pub parallel: bool,
    /// Resolve and log the plan without writing anything.
    pub dry_run: bool,
}

enum Planned {
    Run(ResolvedJob),
    Skip {
        name: String,
        failures: Vec<(Field, DiagnosticCode)>,
    },
}

impl Planned {
    fn name(&self) -> &str {
        match self {
            Planned::Run(job) => &job.name,
            Planned::Skip { name, .. } => name,
        }
    }
}

/// Result of a run, with outcomes in document order.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcomes: Vec<JobOutcome>,
    /// Jobs that would run, with their targets, when `dry_run` was set.
    pub planned: Vec<(String, PathBuf)>,
    pub log_path: Option<PathBuf>,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.count(JobState::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(JobState::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(JobState::Skipped)
    }

    fn count(&self, state: JobState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    /// `Success` only when no job failed or was skipped.
    pub fn exit_code(&self) -> ExitCode {
        if self.outcomes.iter().all(|o| o.state == JobState::Completed) {
            ExitCode::Success
        } else {
            ExitCode::UnknownError
        }
    }
}

/// Refuse to start when archive-mode jobs exist but the archive type has no writer.
pub fn check_capabilities(resolution: &Resolution) -> Result<(), ExitCode> {
    let archive_type = resolution.global.archive_type;
    if archive::is_supported(archive_type) {
        return Ok(());
    }

    let needs_writer = resolution
        .jobs
        .iter()
        .filter_map(|job| resolution.runnable(job).ok())
        .any(|job| !job.copy_only);
    if needs_writer {
        error!(archive_type = %archive_type, "no archive writer for the configured archive type");
        return Err(ExitCode::ModuleLoadFailure);
    }
    Ok(())
}

/// Execute a resolved settings document.
///
/// # Errors
/// Returns the fatal exit code when the run cannot start at all.
pub fn execute(
    resolution: &Resolution,
    options: &RunOptions,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<RunSummary, ExitCode> {
    check_capabilities(resolution)?;

    let settings = ExecutionSettings::from_global(&resolution.global);
    let mut run_log = RunLog::new();
    info!(run_id = %run_log.run_id(), jobs = resolution.jobs.len(), "starting replication run");

    run_log.record_settings(&resolution.global, &resolution.jobs);
    run_log.record_diagnostics(&resolution.report);

    let plans: Vec<Planned> = resolution
        .jobs
        .iter()
        .map(|job| match resolution.runnable(job) {
            Ok(resolved) => Planned::Run(resolved),
            Err(failures) => Planned::Skip {
                name: job.name.clone(),
                failures,
            },
        })
        .collect();

    let targets: Vec<(String, PathBuf)> = plans
        .iter()
        .filter_map(|plan| match plan {
            Planned::Run(job) => Some((job.name.clone(), job.target_path(&settings.archive_ext))),
            Planned::Skip { .. } => None,
        })
        .collect();
    run_log.record_targets(targets.iter().map(|(name, path)| (name.as_str(), path.as_path())));

    if options.dry_run {
        info!(runnable = targets.len(), "dry run, nothing written");
        let outcomes = plans
            .into_iter()
            .filter_map(|plan| match plan {
                Planned::Skip { name, failures } => Some(JobOutcome::skipped(&name, failures)),
                Planned::Run(_) => None,
            })
            .collect();
        return Ok(RunSummary {
            run_id: run_log.run_id(),
            outcomes,
            planned: targets,
            log_path: None,
            dry_run: true,
        });
    }

    let outcomes = if options.parallel {
        execute_parallel(&plans, &settings, progress_callback)
    } else {
        plans
            .iter()
            .map(|plan| execute_plan(plan, &settings, progress_callback))
            .collect()
    };

    for outcome in &outcomes {
        run_log.append_job_log(&outcome.log);
    }

    let log_path = resolution
        .global
        .full_log_path
        .as_deref()
        .and_then(|path| match run_log.write_to(path) {
            Ok(written) => Some(written),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to write run log");
                None
            }
        });

    let summary = RunSummary {
        run_id: run_log.run_id(),
        outcomes,
        planned: Vec::new(),
        log_path,
        dry_run: false,
    };
    info!(
        completed = summary.completed(),
        failed = summary.failed(),
        skipped = summary.skipped(),
        "replication run finished"
    );
    Ok(summary)
}

fn execute_plan(
    plan: &Planned,
    settings: &ExecutionSettings,
    progress_callback: Option<&dyn ProgressCallback>,
) -> JobOutcome {
    match plan {
        Planned::Run(job) => job::run_job(job, settings, progress_callback),
        Planned::Skip { name, failures } => {
            warn!(job = %name, failures = failures.len(), "skipping job with unresolved settings");
            JobOutcome::skipped(name, failures.clone())
        }
    }
}

fn execute_parallel(
    plans: &[Planned],
    settings: &ExecutionSettings,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Vec<JobOutcome> {
    thread::scope(|scope| {
        let handles: Vec<_> = plans
            .iter()
            .map(|plan| scope.spawn(move || execute_plan(plan, settings, progress_callback)))
            .collect();

        plans
            .iter()
            .zip(handles)
            .map(|(plan, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| JobOutcome::failed(plan.name(), "job thread panicked"))
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{resolve, FsProbe, ResolveContext};
    use crate::settings::SettingsDocument;
    use chrono::NaiveDate;
    use std::fs;
    use std::path::Path;

    fn context(working_dir: &Path) -> ResolveContext {
        ResolveContext {
            today: NaiveDate::from_ymd_opt(2023, 11, 1).expect("Invalid date"),
            working_dir: working_dir.to_path_buf(),
        }
    }

    fn json_path(path: &Path) -> String {
        path.to_string_lossy().replace('\\', "\\\\")
    }

    fn resolve_json(json: &str, working_dir: &Path) -> Resolution {
        let document = SettingsDocument::from_json(json).expect("Failed to parse settings");
        resolve(&document, &context(working_dir), &FsProbe)
    }

    fn make_dir(path: PathBuf) -> PathBuf {
        fs::create_dir_all(&path).expect("Failed to create dir");
        path
    }

    fn write_source(root: &Path, name: &str) -> PathBuf {
        let src = root.join(name);
        fs::create_dir_all(&src).expect("Failed to create source dir");
        fs::write(src.join("data.bak"), name.as_bytes()).expect("Failed to write data.bak");
        src
    }

    #[test]
    fn test_skipped_job_does_not_stop_the_run() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        let good = write_source(root, "good");
        let dst = make_dir(root.join("dst"));
        let json = format!(
            r#"{{"globalJobSettings": {{
                "destinationPath": "{dst}",
                "logPath": "{root}",
                "logFileName": "replica",
                "jobs": [
                    {{"Broken": {{}}}},
                    {{"Good": {{"sourcePath": "{good}"}}}}
                ]
            }}}}"#,
            dst = json_path(&dst),
            root = json_path(root),
            good = json_path(&good),
        );
        let resolution = resolve_json(&json, root);

        let summary = execute(&resolution, &RunOptions::default(), None).expect("Run should start");

        let states: Vec<JobState> = summary.outcomes.iter().map(|o| o.state).collect();
        assert_eq!(states, vec![JobState::Skipped, JobState::Completed]);
        assert_eq!(summary.exit_code(), ExitCode::UnknownError);
        assert!(dst.join("Good_2023-Nov-01.zip").is_file());

        let log_path = summary.log_path.expect("Expected a run log");
        assert_eq!(log_path, root.join("replica_2023-Nov-01.log"));
        let log = fs::read_to_string(&log_path).expect("Failed to read run log");
        assert!(log.contains("BrokenSourcePath = -201"));
        assert!(log.find("[Broken]").unwrap() < log.find("[Good]").unwrap());
    }

    #[test]
    fn test_same_day_runs_share_the_log() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        let src = write_source(root, "src");
        let dst = make_dir(root.join("dst"));
        let json = format!(
            r#"{{"globalJobSettings": {{
                "sourcePath": "{}", "destinationPath": "{}", "logPath": "{}", "logFileName": "replica",
                "jobs": [{{"SQL": {{}}}}]
            }}}}"#,
            json_path(&src),
            json_path(&dst),
            json_path(root),
        );
        let resolution = resolve_json(&json, root);

        let first = execute(&resolution, &RunOptions::default(), None).expect("Run should start");
        let second = execute(&resolution, &RunOptions::default(), None).expect("Run should start");

        assert_eq!(first.log_path, second.log_path);
        let log_path = second.log_path.expect("Expected a run log");
        let log = fs::read_to_string(&log_path).expect("Failed to read run log");
        assert!(log.contains(&first.run_id.to_string()));
        assert!(log.contains(&second.run_id.to_string()));
    }

    #[test]
    fn test_parallel_run_keeps_document_order() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        let names = ["Alpha", "Bravo", "Charlie", "Delta"];
        let jobs: Vec<String> = names
            .iter()
            .map(|name| {
                let src = write_source(root, name);
                format!(r#"{{"{}": {{"sourcePath": "{}"}}}}"#, name, json_path(&src))
            })
            .collect();
        let json = format!(
            r#"{{"globalJobSettings": {{"destinationPath": "{}", "archiveType": "gzip", "jobs": [{}]}}}}"#,
            json_path(&root.join("dst")),
            jobs.join(",")
        );
        make_dir(root.join("dst"));
        let resolution = resolve_json(&json, root);
        let options = RunOptions {
            parallel: true,
            dry_run: false,
        };

        let summary = execute(&resolution, &options, None).expect("Run should start");

        let order: Vec<&str> = summary.outcomes.iter().map(|o| o.job.as_str()).collect();
        assert_eq!(order, names.to_vec());
        assert_eq!(summary.exit_code(), ExitCode::Success);
        for name in names {
            assert!(root.join("dst").join(format!("{}_2023-Nov-01.tar.gz", name)).is_file());
        }
        assert!(summary.log_path.is_none());
    }

    #[test]
    fn test_unsupported_archive_type_stops_before_executing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        let src = write_source(root, "src");
        let dst = make_dir(root.join("dst"));
        let json = format!(
            r#"{{"globalJobSettings": {{
                "sourcePath": "{}", "destinationPath": "{}", "archiveType": "SevenZip",
                "jobs": [{{"SQL": {{}}}}]
            }}}}"#,
            json_path(&src),
            json_path(&dst),
        );
        let resolution = resolve_json(&json, root);

        let result = execute(&resolution, &RunOptions::default(), None);

        assert_eq!(result.err(), Some(ExitCode::ModuleLoadFailure));
        let written = fs::read_dir(&dst).expect("Failed to list dst").count();
        assert_eq!(written, 0);
    }

    #[test]
    fn test_unsupported_archive_type_allowed_for_copy_only_jobs() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        let src = write_source(root, "src");
        let dst = make_dir(root.join("dst"));
        let json = format!(
            r#"{{"globalJobSettings": {{
                "sourcePath": "{}", "destinationPath": "{}", "archiveType": "xz", "copyOnly": true,
                "jobs": [{{"SQL": {{}}}}]
            }}}}"#,
            json_path(&src),
            json_path(&dst),
        );
        let resolution = resolve_json(&json, root);

        let summary = execute(&resolution, &RunOptions::default(), None).expect("Run should start");

        assert_eq!(summary.exit_code(), ExitCode::Success);
        assert!(dst.join("SQL_2023-Nov-01").join("data.bak").is_file());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        let src = write_source(root, "src");
        let dst = make_dir(root.join("dst"));
        let json = format!(
            r#"{{"globalJobSettings": {{
                "sourcePath": "{}", "destinationPath": "{}", "logFileName": "replica",
                "jobs": [{{"SQL": {{"archiveName": "%JOBNAME%%DATE%"}}}}]
            }}}}"#,
            json_path(&src),
            json_path(&dst),
        );
        let resolution = resolve_json(&json, root);
        let options = RunOptions {
            parallel: false,
            dry_run: true,
        };

        let summary = execute(&resolution, &options, None).expect("Run should start");

        assert!(summary.dry_run);
        assert_eq!(
            summary.planned,
            vec![("SQL".to_string(), dst.join("SQL_2023-Nov-01.zip"))]
        );
        assert!(summary.outcomes.is_empty());
        assert_eq!(summary.exit_code(), ExitCode::Success);
        assert!(!dst.join("SQL_2023-Nov-01.zip").exists());
        assert!(!root.join("replica_2023-Nov-01.log").exists());
    }
}
