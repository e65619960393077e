//! Run-selection filter: a `suite/scenario` pattern of case-insensitive
//! regex parts, split on the first slash. An empty scenario part matches
//! every scenario in matching suites.

use regex::Regex;

use crate::errors::{HarnessError, Result};

#[derive(Clone, Debug)]
pub struct ScenarioMatcher {
    suite: Regex,
    scenario: Regex,
    pub pattern: String,
}

impl ScenarioMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let (suite_part, scenario_part) = pattern.split_once('/').unwrap_or((pattern, ""));
        Ok(ScenarioMatcher {
            suite: compile(pattern, suite_part)?,
            scenario: compile(pattern, scenario_part)?,
            pattern: pattern.to_string(),
        })
    }

    /// An empty `scenario` argument checks the suite part only, for
    /// suite-level filtering before any scenario runs.
    pub fn matches(&self, suite: &str, scenario: &str) -> bool {
        if !self.suite.is_match(suite) {
            return false;
        }
        scenario.is_empty() || self.scenario.is_match(scenario)
    }
}

fn compile(pattern: &str, part: &str) -> Result<Regex> {
    Regex::new(&format!("(?i:{part})")).map_err(|err| HarnessError::InvalidPattern {
        pattern: pattern.to_string(),
        source: err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_pattern_matches_suite_and_scenario() {
        let matcher = ScenarioMatcher::new("single/ready").expect("valid pattern");
        assert!(matcher.matches("single-node", "node reports ready"));
        assert!(matcher.matches("Single-Node", "Node Reports Ready"));
        assert!(!matcher.matches("single-node", "timezone"));
        assert!(!matcher.matches("multi-node", "node reports ready"));
    }

    #[test]
    fn leading_slash_matches_any_suite() {
        let matcher = ScenarioMatcher::new("/license").expect("valid pattern");
        assert!(matcher.matches("single-node", "invalid license fails"));
        assert!(matcher.matches("anything", "License check"));
        assert!(!matcher.matches("anything", "host count"));
    }

    #[test]
    fn suite_only_pattern_admits_every_scenario() {
        let matcher = ScenarioMatcher::new("upgrade").expect("valid pattern");
        assert!(matcher.matches("upgrade", ""));
        assert!(matcher.matches("upgrade", "data survives"));
        assert!(!matcher.matches("security", ""));
    }

    #[test]
    fn broken_pattern_is_reported() {
        let err = ScenarioMatcher::new("suite/(unclosed").expect_err("bad regex");
        assert!(matches!(err, HarnessError::InvalidPattern { .. }));
    }
}
