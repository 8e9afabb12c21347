//! # Replicator Engine - Scheduled Backup Replication Library
//!
//! A headless engine that replicates backup files into dated archives.
//! Designed to be driven by a scheduler through the `replicate` CLI.
//!
//! ## Overview
//!
//! A JSON settings document names global defaults and an ordered list of
//! jobs. Each job binds a source directory to a destination archive (or a
//! raw copy directory). The engine provides:
//! - Settings loading with inheritance from global settings into jobs
//! - A diagnostic report recording how every field resolved
//! - Archive name templating (`%DATE%`, `%JOBNAME%`, `%DEFAULT%`)
//! - Zip, Tar and GZip archive writers, plus raw copies
//! - Per-file state tracking and error isolation
//! - Progress reporting via callbacks (decoupled from UI technology)
//! - A run log written next to the backups
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::path::Path;
//! use replicator_engine::{execute, load, resolve, FsProbe, ResolveContext, RunOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = load(Path::new("settings.json"))?;
//! let resolution = resolve(&document, &ResolveContext::current(), &FsProbe);
//!
//! for entry in resolution.report.entries() {
//!     println!("{} = {}", entry.key(), entry.state);
//! }
//!
//! match execute(&resolution, &RunOptions::default(), None) {
//!     Ok(summary) => println!("{} jobs completed", summary.completed()),
//!     Err(code) => println!("run aborted: {}", code),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **settings**: Settings document parsing
//! - **resolver**: Default filling, inheritance and validation
//! - **diagnostics**: Per-field resolution report
//! - **template**: Archive name templating
//! - **model**: Core data structures (settings snapshots, FileItem, enums)
//! - **error**: Exit codes, diagnostic codes and error types
//! - **filter**: Include/exclude file filters
//! - **fs_ops**: Low-level filesystem operations
//! - **archive**: Archive writers
//! - **job**: Job execution (plan, run)
//! - **run**: Run driver
//! - **runlog**: Per-job and run log buffers
//! - **progress**: Progress callback trait
//! - **checksums**: Checksum computation and verification

pub mod archive;
pub mod checksums;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod fs_ops;
pub mod job;
pub mod model;
pub mod paths;
pub mod progress;
pub mod resolver;
pub mod run;
pub mod runlog;
pub mod settings;
pub mod template;

// Re-export main types and functions
pub use checksums::{compute_file_checksum, verify_copy, ChecksumAlgorithm, ChecksumValue};
pub use diagnostics::{DiagnosticEntry, DiagnosticReport, DiagnosticState, Field};
pub use error::{DiagnosticCode, EngineError, ExitCode, SettingsError};
pub use job::{plan_job, run_job, ExecutionSettings, JobOutcome};
pub use model::{
    ArchiveType, CompressionLevel, ExtensionSet, FieldResult, FileItem, FileState,
    GlobalSettings, JobSettings, JobState, ResolvedJob,
};
pub use progress::ProgressCallback;
pub use resolver::{resolve, FsProbe, PathProbe, Resolution, ResolveContext};
pub use run::{execute, RunOptions, RunSummary};
pub use runlog::{JobLog, RunLog};
pub use settings::{load, SettingsDocument};
