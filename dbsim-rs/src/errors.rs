//! Failure taxonomy for the verification engine.
//!
//! Every variant is terminal for the enclosing scenario: there is no local
//! recovery, only propagation with enough context to name the container,
//! pattern, or endpoint involved.

use std::time::Duration;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// External command exited abnormally, or wrote to stderr where none
    /// was expected.
    #[error("process `{command}` failed: {detail}")]
    ProcessFailure { command: String, detail: String },

    /// A retry or process budget was exhausted. Carries the last observed
    /// failure so diagnostics point at the final attempt, not the first.
    #[error("timed out after {budget:?}; last failure: {last}")]
    Timeout {
        budget: Duration,
        last: Box<HarnessError>,
    },

    /// Expected content absent from a text blob.
    #[error("pattern `{pattern}` not found in {context}; captured tail: {excerpt}")]
    PatternMismatch {
        context: String,
        pattern: String,
        excerpt: String,
    },

    /// A parsed value did not equal the expected literal.
    #[error("{context}: expected `{expected}`, got `{actual}`")]
    AssertionMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// A response body did not have the documented shape.
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),

    #[error("unknown timezone `{0}`")]
    UnknownTimezone(String),

    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Auth(#[from] diqwest::error::Error),
}

impl HarnessError {
    pub fn process(command: impl Into<String>, detail: impl Into<String>) -> Self {
        HarnessError::ProcessFailure {
            command: command.into(),
            detail: detail.into(),
        }
    }

    pub fn timeout(budget: Duration, last: HarnessError) -> Self {
        HarnessError::Timeout {
            budget,
            last: Box::new(last),
        }
    }

    pub fn assertion(
        context: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        HarnessError::AssertionMismatch {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
