//! Archive name templating.
//!
//! Archive names may contain the tokens `%DATE%`, `%JOBNAME%` and
//! `%DEFAULT%`. Expansion first fixes delimiter placement around tokens,
//! then substitutes them, so substituted text never affects placement.

use chrono::NaiveDate;

pub const DATE_TOKEN: &str = "%DATE%";
pub const JOBNAME_TOKEN: &str = "%JOBNAME%";
pub const DEFAULT_TOKEN: &str = "%DEFAULT%";

const TOKENS: [&str; 3] = [DATE_TOKEN, JOBNAME_TOKEN, DEFAULT_TOKEN];

/// Format a run date as used in archive and log names, e.g. `2023-Nov-01`.
pub fn format_run_date(date: NaiveDate) -> String {
    date.format("%Y-%b-%d").to_string().replace('.', "")
}

/// Values substituted into an archive name.
#[derive(Debug, Clone, Copy)]
pub struct NameContext<'a> {
    pub job_name: &'a str,
    pub delimiter: &'a str,
    pub date: &'a str,
}

impl NameContext<'_> {
    /// `jobName + delimiter + date`, used when no archive name is given.
    pub fn default_name(&self) -> String {
        format!("{}{}{}", self.job_name, self.delimiter, self.date)
    }

    /// Expand an archive name template.
    pub fn expand(&self, template: &str) -> String {
        let spaced = separate_tokens(template.trim(), self.delimiter);
        let spaced = spaced.replace("%%", &format!("%{}%", self.delimiter));

        spaced
            .replace(DATE_TOKEN, self.date)
            .replace(JOBNAME_TOKEN, self.job_name)
            .replace(DEFAULT_TOKEN, &self.default_name())
    }
}

/// Earliest known token in `text`, as (byte offset, token).
fn next_token(text: &str) -> Option<(usize, &'static str)> {
    text.match_indices('%').find_map(|(start, _)| {
        TOKENS
            .iter()
            .find(|token| text[start..].starts_with(*token))
            .map(|token| (start, *token))
    })
}

/// Insert `delimiter` between a token and directly adjacent literal text.
///
/// Text already ending (or starting) with the delimiter is left alone, as is
/// a neighbouring `%`, which the `%%` pass handles.
fn separate_tokens(text: &str, delimiter: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4 * delimiter.len());
    let mut rest = text;

    while let Some((start, token)) = next_token(rest) {
        out.push_str(&rest[..start]);
        if !out.is_empty() && !out.ends_with('%') && !out.ends_with(delimiter) {
            out.push_str(delimiter);
        }
        out.push_str(token);

        rest = &rest[start + token.len()..];
        if !rest.is_empty() && !rest.starts_with('%') && !rest.starts_with(delimiter) {
            out.push_str(delimiter);
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(job_name: &'a str, date: &'a str) -> NameContext<'a> {
        NameContext {
            job_name,
            delimiter: "_",
            date,
        }
    }

    #[test]
    fn test_format_run_date() {
        let date = NaiveDate::from_ymd_opt(2023, 11, 1).expect("valid date");
        assert_eq!(format_run_date(date), "2023-Nov-01");
    }

    #[test]
    fn test_default_token() {
        let ctx = context("Financial", "2023-Nov-01");
        assert_eq!(ctx.expand("%DEFAULT%"), "Financial_2023-Nov-01");
    }

    #[test]
    fn test_adjacent_tokens_get_delimiter() {
        let ctx = context("Financial", "2023-Nov-01");
        assert_eq!(ctx.expand("%JOBNAME%%DATE%"), "Financial_2023-Nov-01");
    }

    #[test]
    fn test_existing_delimiter_is_kept() {
        let ctx = context("Financial", "2023-Nov-01");
        assert_eq!(ctx.expand("Data_%DATE%"), "Data_2023-Nov-01");
    }

    #[test]
    fn test_literal_before_and_after_token() {
        let ctx = context("SQL", "2023-Nov-01");
        assert_eq!(ctx.expand("Data%DATE%"), "Data_2023-Nov-01");
        assert_eq!(ctx.expand("%JOBNAME%backup"), "SQL_backup");
        assert_eq!(ctx.expand("pre%JOBNAME%post"), "pre_SQL_post");
    }

    #[test]
    fn test_substituted_text_does_not_trigger_adjacency() {
        // The job name ends in a literal; no delimiter is added after substitution.
        let ctx = context("Nightly", "2023-Nov-01");
        assert_eq!(ctx.expand("%JOBNAME%_%DATE%"), "Nightly_2023-Nov-01");
    }

    #[test]
    fn test_template_without_tokens_is_trimmed_only() {
        let ctx = context("SQL", "2023-Nov-01");
        assert_eq!(ctx.expand("  weekly-archive "), "weekly-archive");
    }

    #[test]
    fn test_multi_character_delimiter() {
        let ctx = NameContext {
            job_name: "SQL",
            delimiter: "--",
            date: "2023-Nov-01",
        };
        assert_eq!(ctx.expand("%JOBNAME%%DATE%"), "SQL--2023-Nov-01");
        assert_eq!(ctx.expand("x--%DATE%"), "x--2023-Nov-01");
        assert_eq!(ctx.default_name(), "SQL--2023-Nov-01");
    }

    #[test]
    fn test_unknown_tokens_are_left_alone() {
        let ctx = context("SQL", "2023-Nov-01");
        assert_eq!(ctx.expand("a%HOST%"), "a%HOST%");
    }

    #[test]
    fn test_expansion_is_deterministic() {
        let ctx = context("SQL", "2023-Nov-01");
        assert_eq!(ctx.expand("%DEFAULT%"), ctx.expand("%DEFAULT%"));
    }
}
