//! Directory path normalization.

use std::path::MAIN_SEPARATOR;

/// Ensure `path` ends with the platform separator.
///
/// No other transformation is made: the path is not checked for existence
/// and its case is preserved. An empty input yields the bare separator.
pub fn normalize(path: &str) -> String {
    if path.ends_with(MAIN_SEPARATOR) {
        path.to_string()
    } else {
        format!("{}{}", path, MAIN_SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_separator() {
        let expected = format!("backups{}", MAIN_SEPARATOR);
        assert_eq!(normalize("backups"), expected);
    }

    #[test]
    fn test_keeps_existing_separator() {
        let path = format!("backups{}", MAIN_SEPARATOR);
        assert_eq!(normalize(&path), path);
    }

    #[test]
    fn test_is_idempotent() {
        for input in ["a", "C:", "/var/backups", "nested/dir", " spaced "] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_empty_becomes_separator() {
        assert_eq!(normalize(""), MAIN_SEPARATOR.to_string());
    }
}
