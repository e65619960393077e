//! Content checks over captured text blobs.
//!
//! Log streams and response bodies are treated as one text unit per check:
//! matching is substring over the whole blob, never line-anchored. Glob mode
//! (`*` spans newlines, `?` is one character) covers most log assertions;
//! raw regex mode is used where case structure matters.

use regex::Regex;

use crate::errors::{HarnessError, Result};

const EXCERPT_LEN: usize = 400;

fn compile(pattern: &str, source: &str) -> Result<Regex> {
    Regex::new(source).map_err(|err| HarnessError::InvalidPattern {
        pattern: pattern.to_string(),
        source: err,
    })
}

fn glob_to_regex(pattern: &str) -> String {
    // (?s) lets `*` run across newlines; everything else is literal.
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)");
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out
}

pub fn matches_glob(text: &str, pattern: &str) -> Result<bool> {
    Ok(compile(pattern, &glob_to_regex(pattern))?.is_match(text))
}

pub fn matches_regex(text: &str, pattern: &str) -> Result<bool> {
    Ok(compile(pattern, pattern)?.is_match(text))
}

pub fn assert_glob(text: &str, pattern: &str, context: &str) -> Result<()> {
    if matches_glob(text, pattern)? {
        Ok(())
    } else {
        Err(mismatch(text, pattern, context))
    }
}

pub fn assert_regex(text: &str, pattern: &str, context: &str) -> Result<()> {
    if matches_regex(text, pattern)? {
        Ok(())
    } else {
        Err(mismatch(text, pattern, context))
    }
}

fn mismatch(text: &str, pattern: &str, context: &str) -> HarnessError {
    HarnessError::PatternMismatch {
        context: context.to_string(),
        pattern: pattern.to_string(),
        excerpt: excerpt(text),
    }
}

/// Bounded tail of the searched blob; recent log lines are where the
/// interesting failures live.
fn excerpt(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.len() <= EXCERPT_LEN {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - EXCERPT_LEN;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_star_spans_newlines() {
        let logs = "starting node\njoining cluster\nCluster config complete\n";
        assert!(matches_glob(logs, "*starting*complete*").expect("valid pattern"));
        assert!(!matches_glob(logs, "*shutting down*").expect("valid pattern"));
    }

    #[test]
    fn glob_is_substring_not_anchored() {
        assert!(matches_glob("abc marker xyz", "marker").expect("valid pattern"));
        assert!(matches_glob("abc marker xyz", "m?rker").expect("valid pattern"));
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        assert!(matches_glob("cost (total): $5", "cost (total): $5").expect("valid pattern"));
        assert!(!matches_glob("cost total: 5", "cost (total): $5").expect("valid pattern"));
    }

    #[test]
    fn matching_is_idempotent() {
        let logs = "one\ntwo\nthree";
        let first = matches_glob(logs, "*two*").expect("valid pattern");
        let second = matches_glob(logs, "*two*").expect("valid pattern");
        assert_eq!(first, second);
    }

    #[test]
    fn mismatch_carries_context_pattern_and_excerpt() {
        let err = assert_glob("short output", "*absent*", "logs of container demo")
            .expect_err("pattern is absent");
        match err {
            HarnessError::PatternMismatch {
                context,
                pattern,
                excerpt,
            } => {
                assert_eq!(context, "logs of container demo");
                assert_eq!(pattern, "*absent*");
                assert_eq!(excerpt, "short output");
            }
            other => panic!("expected PatternMismatch, got {other:?}"),
        }
    }

    #[test]
    fn excerpt_is_bounded_to_the_tail() {
        let long = "x".repeat(1000) + "needle";
        let err = assert_glob(&long, "*haystack*", "blob").expect_err("absent");
        let text = err.to_string();
        assert!(text.contains("needle"));
        assert!(text.len() < 600);
    }

    #[test]
    fn regex_mode_is_case_sensitive() {
        assert!(matches_regex("ERROR: bad license", "ERROR: .*license").expect("valid"));
        assert!(!matches_regex("error: bad license", "ERROR: .*license").expect("valid"));
    }

    #[test]
    fn invalid_regex_is_reported_not_panicked() {
        let err = matches_regex("text", "(unclosed").expect_err("bad pattern");
        assert!(matches!(err, HarnessError::InvalidPattern { .. }));
    }
}
