//! Include/exclude filtering of source files by name.
//!
//! Patterns without glob metacharacters are treated as extensions, so
//! `bak`, `.bak` and `*.bak` all select `backup.BAK`. Matching is
//! case-insensitive and applies to the file name only.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::EngineError;
use crate::model::ExtensionSet;

#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl FileFilter {
    /// Compile include and exclude sets. An empty include set selects every file.
    pub fn new(include: &ExtensionSet, exclude: &ExtensionSet) -> Result<Self, EngineError> {
        Ok(FileFilter {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };

        if let Some(include) = &self.include {
            if !include.is_match(name) {
                return false;
            }
        }

        match &self.exclude {
            Some(exclude) => !exclude.is_match(name),
            None => true,
        }
    }
}

fn to_glob(pattern: &str) -> String {
    if pattern.contains(['*', '?', '[']) {
        pattern.to_string()
    } else {
        format!("*.{}", pattern.trim_start_matches('.'))
    }
}

fn compile(patterns: &ExtensionSet) -> Result<Option<GlobSet>, EngineError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns.iter() {
        let glob = GlobBuilder::new(&to_glob(pattern))
            .case_insensitive(true)
            .literal_separator(true)
            .build()
            .map_err(|source| EngineError::InvalidFilter {
                pattern: pattern.to_string(),
                source,
            })?;
        builder.add(glob);
    }

    let set = builder.build().map_err(|source| EngineError::InvalidFilter {
        pattern: patterns.to_string(),
        source,
    })?;
    Ok(Some(set))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &str, exclude: &str) -> FileFilter {
        FileFilter::new(&ExtensionSet::parse(include), &ExtensionSet::parse(exclude))
            .expect("Failed to compile filter")
    }

    #[test]
    fn test_empty_include_selects_everything() {
        let f = filter("", "");
        assert!(f.matches(Path::new("/src/a.txt")));
        assert!(f.matches(Path::new("/src/noext")));
    }

    #[test]
    fn test_extension_forms_are_equivalent() {
        for include in ["bak", ".bak", "*.bak"] {
            let f = filter(include, "");
            assert!(f.matches(Path::new("db/full.bak")), "{} should match", include);
            assert!(f.matches(Path::new("db/FULL.BAK")), "{} should ignore case", include);
            assert!(!f.matches(Path::new("db/full.trn")), "{} should not match .trn", include);
        }
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let f = filter("*.bak, *.trn", "*.trn");
        assert!(f.matches(Path::new("full.bak")));
        assert!(!f.matches(Path::new("log.trn")));
    }

    #[test]
    fn test_exclude_only() {
        let f = filter("", "tmp");
        assert!(f.matches(Path::new("keep.txt")));
        assert!(!f.matches(Path::new("scratch.tmp")));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let result = FileFilter::new(&ExtensionSet::parse("[bak"), &ExtensionSet::default());
        assert!(matches!(result, Err(EngineError::InvalidFilter { .. })));
    }
}
