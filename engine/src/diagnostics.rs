//! The diagnostic report produced by settings resolution.
//!
//! Entries are keyed by field name, optionally prefixed by the job name
//! (`"SourcePath"`, `"SQLSourcePath"`), and kept in the order they were first
//! recorded so the run log lists them in resolution order.

use std::collections::HashMap;
use std::fmt;

use crate::error::DiagnosticCode;

/// A settings field tracked in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    SourcePath,
    DestinationPath,
    LogPath,
    LogFileName,
    LogExtension,
    CompressionLevel,
    ArchiveType,
    FileNameDelimiter,
    IncludeExtension,
    ExcludeExtension,
    ArchiveName,
    CopyOnly,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Self::SourcePath => "SourcePath",
            Self::DestinationPath => "DestinationPath",
            Self::LogPath => "LogPath",
            Self::LogFileName => "LogFileName",
            Self::LogExtension => "LogExtension",
            Self::CompressionLevel => "CompressionLevel",
            Self::ArchiveType => "ArchiveType",
            Self::FileNameDelimiter => "FileNameDelimiter",
            Self::IncludeExtension => "IncludeExtension",
            Self::ExcludeExtension => "ExcludeExtension",
            Self::ArchiveName => "ArchiveName",
            Self::CopyOnly => "CopyOnly",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolution state of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticState {
    /// Not yet processed. Never present once resolution completes.
    Unresolved,
    Resolved,
    Failed(DiagnosticCode),
}

impl DiagnosticState {
    pub fn is_resolved(self) -> bool {
        self == Self::Resolved
    }
}

impl fmt::Display for DiagnosticState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => write!(f, "false"),
            Self::Resolved => write!(f, "true"),
            Self::Failed(code) => write!(f, "{}", code.code()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub job: Option<String>,
    pub field: Field,
    pub state: DiagnosticState,
}

impl DiagnosticEntry {
    /// The flat key, e.g. `"SourcePath"` or `"SQLSourcePath"`.
    pub fn key(&self) -> String {
        diagnostic_key(self.job.as_deref(), self.field)
    }
}

pub fn diagnostic_key(job: Option<&str>, field: Field) -> String {
    match job {
        Some(job) => format!("{}{}", job, field.name()),
        None => field.name().to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    entries: Vec<DiagnosticEntry>,
    global_index: HashMap<Field, usize>,
    job_index: HashMap<String, HashMap<Field, usize>>,
}

impl DiagnosticReport {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, job: Option<&str>, field: Field) -> Option<usize> {
        match job {
            None => self.global_index.get(&field).copied(),
            Some(job) => self
                .job_index
                .get(job)
                .and_then(|fields| fields.get(&field))
                .copied(),
        }
    }

    /// Record the state of a field, replacing any earlier state.
    pub fn set(&mut self, job: Option<&str>, field: Field, state: DiagnosticState) {
        if let Some(position) = self.position(job, field) {
            self.entries[position].state = state;
            return;
        }

        let position = self.entries.len();
        match job {
            None => {
                self.global_index.insert(field, position);
            }
            Some(job) => {
                self.job_index
                    .entry(job.to_string())
                    .or_default()
                    .insert(field, position);
            }
        }
        self.entries.push(DiagnosticEntry {
            job: job.map(str::to_string),
            field,
            state,
        });
    }

    /// State of a field; fields never recorded are `Unresolved`.
    pub fn state(&self, job: Option<&str>, field: Field) -> DiagnosticState {
        self.position(job, field)
            .map(|position| self.entries[position].state)
            .unwrap_or(DiagnosticState::Unresolved)
    }

    pub fn global(&self, field: Field) -> DiagnosticState {
        self.state(None, field)
    }

    pub fn job(&self, job: &str, field: Field) -> DiagnosticState {
        self.state(Some(job), field)
    }

    /// Look up by flat key, e.g. `"SQLSourcePath"`.
    pub fn get(&self, key: &str) -> DiagnosticState {
        self.entries
            .iter()
            .find(|e| e.key() == key)
            .map(|e| e.state)
            .unwrap_or(DiagnosticState::Unresolved)
    }

    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    /// Failed fields of one job, in resolution order.
    pub fn job_failures(&self, job: &str) -> Vec<(Field, DiagnosticCode)> {
        let mut positions: Vec<usize> = self
            .job_index
            .get(job)
            .map(|fields| fields.values().copied().collect())
            .unwrap_or_default();
        positions.sort_unstable();

        positions
            .into_iter()
            .map(|position| &self.entries[position])
            .filter_map(|e| match e.state {
                DiagnosticState::Failed(code) => Some((e.field, code)),
                _ => None,
            })
            .collect()
    }

    /// True when no recorded field is left unresolved.
    pub fn is_complete(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.state != DiagnosticState::Unresolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecorded_field_is_unresolved() {
        let report = DiagnosticReport::new();
        assert_eq!(report.global(Field::SourcePath), DiagnosticState::Unresolved);
    }

    #[test]
    fn test_set_replaces_previous_state() {
        let mut report = DiagnosticReport::new();
        report.set(None, Field::DestinationPath, DiagnosticState::Resolved);
        report.set(
            None,
            Field::DestinationPath,
            DiagnosticState::Failed(DiagnosticCode::DestinationPathNotFound),
        );

        assert_eq!(report.entries().len(), 1);
        assert_eq!(
            report.global(Field::DestinationPath),
            DiagnosticState::Failed(DiagnosticCode::DestinationPathNotFound)
        );
    }

    #[test]
    fn test_job_qualified_keys() {
        let mut report = DiagnosticReport::new();
        report.set(
            Some("SQL"),
            Field::SourcePath,
            DiagnosticState::Failed(DiagnosticCode::JobSourcePath),
        );
        report.set(Some("SQL"), Field::ArchiveName, DiagnosticState::Resolved);

        assert_eq!(report.entries()[0].key(), "SQLSourcePath");
        assert_eq!(
            report.get("SQLSourcePath"),
            DiagnosticState::Failed(DiagnosticCode::JobSourcePath)
        );
        assert_eq!(
            report.job_failures("SQL"),
            vec![(Field::SourcePath, DiagnosticCode::JobSourcePath)]
        );
        assert!(report.job_failures("Other").is_empty());
    }

    #[test]
    fn test_entries_keep_first_recorded_order() {
        let mut report = DiagnosticReport::new();
        report.set(None, Field::SourcePath, DiagnosticState::Resolved);
        for job in ["Alpha", "Bravo"] {
            report.set(Some(job), Field::SourcePath, DiagnosticState::Unresolved);
            report.set(Some(job), Field::DestinationPath, DiagnosticState::Unresolved);
        }
        report.set(
            Some("Alpha"),
            Field::DestinationPath,
            DiagnosticState::Failed(DiagnosticCode::JobDestinationPath),
        );
        report.set(
            Some("Alpha"),
            Field::SourcePath,
            DiagnosticState::Failed(DiagnosticCode::JobSourcePath),
        );
        report.set(
            None,
            Field::SourcePath,
            DiagnosticState::Failed(DiagnosticCode::SourcePathNotFound),
        );

        let keys: Vec<String> = report.entries().iter().map(DiagnosticEntry::key).collect();
        assert_eq!(
            keys,
            vec![
                "SourcePath",
                "AlphaSourcePath",
                "AlphaDestinationPath",
                "BravoSourcePath",
                "BravoDestinationPath",
            ]
        );
        assert_eq!(report.job("Bravo", Field::SourcePath), DiagnosticState::Unresolved);
        assert_eq!(
            report.global(Field::SourcePath),
            DiagnosticState::Failed(DiagnosticCode::SourcePathNotFound)
        );
        assert_eq!(
            report.job_failures("Alpha"),
            vec![
                (Field::SourcePath, DiagnosticCode::JobSourcePath),
                (Field::DestinationPath, DiagnosticCode::JobDestinationPath),
            ]
        );
    }

    #[test]
    fn test_state_display_matches_log_format() {
        assert_eq!(DiagnosticState::Resolved.to_string(), "true");
        assert_eq!(
            DiagnosticState::Failed(DiagnosticCode::JobSourcePath).to_string(),
            "-201"
        );
    }

    #[test]
    fn test_is_complete() {
        let mut report = DiagnosticReport::new();
        report.set(None, Field::LogPath, DiagnosticState::Unresolved);
        assert!(!report.is_complete());
        report.set(None, Field::LogPath, DiagnosticState::Resolved);
        assert!(report.is_complete());
    }
}
