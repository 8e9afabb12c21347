//! replicate - Command-line front end for the replication engine.
//!
//! Reads a settings document, resolves it, runs every job and exits with the
//! run's status code. Intended to be launched by a scheduler.

mod logging;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use replicator_engine::{
    execute, load, resolve, ExitCode, FileItem, FileState, FsProbe, JobOutcome, JobState,
    ProgressCallback, ResolveContext, ResolvedJob, RunOptions, RunSummary,
};

/// replicate - Archive backup files into dated replicas
#[derive(Parser, Debug)]
#[command(name = "replicate")]
#[command(version)]
#[command(about = "Replicate backup files into dated archives as described by a settings file")]
struct Args {
    /// Settings document
    #[arg(long, value_name = "PATH", default_value = "settings.json")]
    settings: PathBuf,

    /// Run jobs concurrently
    #[arg(long)]
    parallel: bool,

    /// Resolve settings and show the plan without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// CLI implementation of ProgressCallback for displaying job progress
struct CliProgress {
    verbose: bool,
    last_progress_update: Mutex<Instant>,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            last_progress_update: Mutex::new(Instant::now()),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    /// Throttle updates to at most one every 200ms.
    fn should_report(&self) -> bool {
        let Ok(mut last) = self.last_progress_update.lock() else {
            return false;
        };
        if last.elapsed().as_millis() < 200 {
            return false;
        }
        *last = Instant::now();
        true
    }
}

impl ProgressCallback for CliProgress {
    fn on_job_started(&self, job: &ResolvedJob, files: &[FileItem]) {
        let total: u64 = files.iter().map(|f| f.file_size).sum();
        eprintln!(
            "[{}] {} files ({}) from {}",
            job.name,
            files.len(),
            Self::format_bytes(total),
            job.source_path.display()
        );
    }

    fn on_file_completed(&self, job: &ResolvedJob, file_index: usize, file: &FileItem) {
        if self.verbose {
            let status = match file.state {
                FileState::Done => "Done",
                FileState::Failed => "Failed",
                FileState::Pending => "Pending",
            };
            eprintln!("[{}] [{:3}] {}: {}", job.name, file_index, status, file.entry_name());
        } else if self.should_report() {
            eprintln!("[{}] {} files processed", job.name, file_index + 1);
        }
    }

    fn on_job_completed(&self, job: &ResolvedJob, outcome: &JobOutcome) {
        eprintln!(
            "[{}] {}: {} done, {} failed, {} in {}",
            job.name,
            outcome.state,
            outcome.done_count(),
            outcome.failed_count(),
            Self::format_bytes(outcome.bytes_written),
            Self::format_duration(outcome.elapsed)
        );

        for file in outcome.files.iter().filter(|f| f.state == FileState::Failed) {
            eprintln!(
                "  {}: {}",
                file.entry_name(),
                file.error_message.as_deref().unwrap_or("(unknown error)")
            );
        }
    }
}

fn print_summary(summary: &RunSummary, elapsed: std::time::Duration) {
    eprintln!();
    if summary.dry_run {
        eprintln!("Dry run {}: nothing written", summary.run_id);
        for (job, target) in &summary.planned {
            eprintln!("  {} -> {}", job, target.display());
        }
    } else {
        eprintln!(
            "Run {}: {} completed, {} failed, {} skipped",
            summary.run_id,
            summary.completed(),
            summary.failed(),
            summary.skipped()
        );
    }

    for outcome in summary.outcomes.iter().filter(|o| o.state == JobState::Skipped) {
        let codes: Vec<String> = outcome
            .skipped_for
            .iter()
            .map(|(field, code)| format!("{}{} = {}", outcome.job, field.name(), code.code()))
            .collect();
        eprintln!("  skipped {}: {}", outcome.job, codes.join(", "));
    }

    if let Some(path) = &summary.log_path {
        eprintln!("Log: {}", path.display());
    }
    eprintln!("Elapsed: {}", CliProgress::format_duration(elapsed));
}

/// Parse arguments, run, and exit with the run's status code
fn main() {
    let args = Args::parse();

    if let Err(e) = logging::init_tracing(args.verbose) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }

    let exit_code = run_cli(&args);
    std::process::exit(exit_code.code());
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> ExitCode {
    let started = Instant::now();

    let document = match load(&args.settings) {
        Ok(document) => document,
        Err(e) => {
            tracing::error!(error = %e, "cannot load settings");
            eprintln!("Error: {}", e);
            return e.exit_code();
        }
    };

    let resolution = resolve(&document, &ResolveContext::current(), &FsProbe);
    if args.verbose {
        for entry in resolution.report.entries() {
            eprintln!("{} = {}", entry.key(), entry.state);
        }
    }

    let options = RunOptions {
        parallel: args.parallel,
        dry_run: args.dry_run,
    };
    let progress = CliProgress::new(args.verbose);

    match execute(&resolution, &options, Some(&progress)) {
        Ok(summary) => {
            print_summary(&summary, started.elapsed());
            summary.exit_code()
        }
        Err(code) => {
            eprintln!("Error: run aborted ({})", code);
            code
        }
    }
}
