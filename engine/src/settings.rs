//! Settings document loading.
//!
//! The settings file is a JSON document of the form:
//!
//! ```json
//! {
//!   "globalJobSettings": {
//!     "sourcePath": "D:\\Backups",
//!     "destinationPath": "\\\\nas\\replica",
//!     "logFileName": "replication",
//!     "archiveType": "Zip",
//!     "jobs": [
//!       { "SQL": { "includeExtension": "*.bak, *.trn" } },
//!       { "Financial": { "archiveName": "%JOBNAME%%DATE%" } }
//!     ]
//!   }
//! }
//! ```
//!
//! This module only reads and parses. Defaults, inheritance and validation
//! belong to the resolver.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::checksums::ChecksumAlgorithm;
use crate::error::SettingsError;
use crate::model::{ArchiveType, CompressionLevel, ExtensionSet};

/// An include/exclude list as written in the document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExtensionList {
    /// `"*.bak, *.trn"`
    Csv(String),
    /// `["*.bak", "*.trn"]`
    Items(Vec<String>),
}

impl ExtensionList {
    pub fn to_set(&self) -> ExtensionSet {
        match self {
            Self::Csv(list) => ExtensionSet::parse(list),
            Self::Items(items) => ExtensionSet::from_items(items),
        }
    }
}

/// The `globalJobSettings` section, excluding `jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGlobalSettings {
    pub source_path: Option<String>,
    pub destination_path: Option<String>,
    pub log_path: Option<String>,
    pub log_file_name: Option<String>,
    pub log_extension: Option<String>,
    pub compression_level: Option<CompressionLevel>,
    pub archive_type: Option<ArchiveType>,
    pub file_name_delimiter: Option<String>,
    pub include_extension: Option<ExtensionList>,
    pub exclude_extension: Option<ExtensionList>,
    pub copy_only: Option<bool>,
    pub checksum: Option<ChecksumAlgorithm>,
}

/// One job's settings as written in the document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawJobSettings {
    pub source_path: Option<String>,
    pub destination_path: Option<String>,
    pub include_extension: Option<ExtensionList>,
    pub exclude_extension: Option<ExtensionList>,
    pub compression_level: Option<CompressionLevel>,
    pub archive_name: Option<String>,
    pub copy_only: Option<bool>,
}

/// A named job entry, in document order.
#[derive(Debug, Clone)]
pub struct RawJob {
    pub name: String,
    pub settings: RawJobSettings,
}

/// The parsed settings document.
#[derive(Debug, Clone, Default)]
pub struct SettingsDocument {
    pub global: RawGlobalSettings,
    pub jobs: Vec<RawJob>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRoot {
    global_job_settings: GlobalSection,
}

#[derive(Deserialize)]
struct GlobalSection {
    #[serde(flatten)]
    settings: RawGlobalSettings,
    #[serde(default)]
    jobs: Vec<BTreeMap<String, RawJobSettings>>,
}

impl SettingsDocument {
    /// Parse a settings document from JSON text.
    ///
    /// Returns the parser's message on failure; `load` wraps it with the path.
    pub fn from_json(text: &str) -> Result<Self, String> {
        let text = text.trim_start_matches('\u{feff}');
        let root: DocumentRoot = serde_json::from_str(text).map_err(|e| e.to_string())?;

        let mut jobs = Vec::with_capacity(root.global_job_settings.jobs.len());
        for (index, entry) in root.global_job_settings.jobs.into_iter().enumerate() {
            if entry.len() != 1 {
                return Err(format!(
                    "job entry {} must hold exactly one named job, found {}",
                    index,
                    entry.len()
                ));
            }
            jobs.extend(entry.into_iter().map(|(name, settings)| RawJob { name, settings }));
        }

        Ok(SettingsDocument {
            global: root.global_job_settings.settings,
            jobs,
        })
    }

    /// First job name that appears more than once, if any.
    pub fn duplicate_job_name(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.jobs
            .iter()
            .map(|job| job.name.as_str())
            .find(|name| !seen.insert(*name))
    }
}

/// Load and parse the settings file at `path`.
///
/// # Errors
/// - `SettingsError::Missing` if the path is not a readable, non-empty file
/// - `SettingsError::Parse` for any malformed or mistyped content
/// - `SettingsError::DuplicateJob` if two jobs share a name
pub fn load(path: &Path) -> Result<SettingsDocument, SettingsError> {
    let missing = || SettingsError::Missing {
        path: path.to_path_buf(),
    };

    let bytes = fs::read(path).map_err(|_| missing())?;
    let text = String::from_utf8_lossy(&bytes);
    if text.trim_start_matches('\u{feff}').trim().is_empty() {
        return Err(missing());
    }

    let document = SettingsDocument::from_json(&text).map_err(|message| SettingsError::Parse {
        path: path.to_path_buf(),
        message,
    })?;

    if let Some(name) = document.duplicate_job_name() {
        return Err(SettingsError::DuplicateJob {
            name: name.to_string(),
        });
    }

    debug!(path = %path.display(), jobs = document.jobs.len(), "loaded settings");
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "globalJobSettings": {
            "sourcePath": "/data/backups",
            "destinationPath": "/mnt/replica",
            "logFileName": "replication",
            "compressionLevel": "normal",
            "archiveType": "GZip",
            "includeExtension": "*.bak, *.trn",
            "checksum": "sha256",
            "jobs": [
                { "SQL": { "excludeExtension": ["*.tmp", " *.log "] } },
                { "Financial": { "archiveName": "%JOBNAME%%DATE%", "copyOnly": true } }
            ]
        }
    }"#;

    #[test]
    fn test_parses_global_fields_and_jobs_in_order() {
        let doc = SettingsDocument::from_json(SAMPLE).expect("Failed to parse sample");

        assert_eq!(doc.global.source_path.as_deref(), Some("/data/backups"));
        assert_eq!(doc.global.compression_level, Some(CompressionLevel::Normal));
        assert_eq!(doc.global.archive_type, Some(ArchiveType::GZip));
        assert_eq!(doc.global.checksum, Some(ChecksumAlgorithm::Sha256));
        assert_eq!(
            doc.global.include_extension.as_ref().map(ExtensionList::to_set),
            Some(ExtensionSet::parse("*.bak,*.trn"))
        );

        let names: Vec<&str> = doc.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["SQL", "Financial"]);

        let sql = &doc.jobs[0].settings;
        let exclude = sql.exclude_extension.as_ref().expect("exclude missing").to_set();
        assert!(exclude.contains("*.log"));
        assert_eq!(doc.jobs[1].settings.copy_only, Some(true));
    }

    #[test]
    fn test_missing_jobs_is_empty_list() {
        let doc = SettingsDocument::from_json(r#"{ "globalJobSettings": {} }"#)
            .expect("Failed to parse");
        assert!(doc.jobs.is_empty());
        assert!(doc.global.source_path.is_none());
    }

    #[test]
    fn test_unknown_enum_value_is_parse_error() {
        let result = SettingsDocument::from_json(
            r#"{ "globalJobSettings": { "compressionLevel": "Turbo" } }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_job_entry_must_hold_one_job() {
        for jobs in [r#"[ { "B": {}, "A": {} } ]"#, r#"[ {} ]"#] {
            let json = format!(r#"{{ "globalJobSettings": {{ "jobs": {} }} }}"#, jobs);
            let result = SettingsDocument::from_json(&json);
            assert!(result.is_err(), "accepted {}", jobs);
        }
    }

    #[test]
    fn test_load_rejects_multi_job_entry() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "globalJobSettings": { "jobs": [ { "SQL": {}, "Financial": {} } ] } }"#,
        )
        .expect("Failed to write settings");

        assert!(matches!(load(&path), Err(SettingsError::Parse { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = load(&temp_dir.path().join("settings.json"));
        assert!(matches!(result, Err(SettingsError::Missing { .. })));
    }

    #[test]
    fn test_load_empty_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, "  \n").expect("Failed to write settings");

        let result = load(&path);
        assert!(matches!(result, Err(SettingsError::Missing { .. })));
    }

    #[test]
    fn test_load_malformed_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, "{ not json").expect("Failed to write settings");

        let result = load(&path);
        assert!(matches!(result, Err(SettingsError::Parse { .. })));
    }

    #[test]
    fn test_load_rejects_duplicate_job_names() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "globalJobSettings": { "jobs": [ { "SQL": {} }, { "SQL": {} } ] } }"#,
        )
        .expect("Failed to write settings");

        match load(&path) {
            Err(SettingsError::DuplicateJob { name }) => assert_eq!(name, "SQL"),
            other => panic!("expected duplicate job error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_accepts_byte_order_mark() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, format!("\u{feff}{}", SAMPLE)).expect("Failed to write settings");

        let doc = load(&path).expect("Failed to load settings with BOM");
        assert_eq!(doc.jobs.len(), 2);
    }
}
