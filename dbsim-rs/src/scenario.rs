//! Scenario and suite execution.
//!
//! A suite is a named collection of scenarios; each scenario runs inside
//! its own task with its own [`Scenario`] context, and its teardown runs
//! whether the body passed, failed, or panicked. Results are collected
//! into serializable reports rather than posted anywhere — this harness is
//! the orchestrator.

use core::fmt::Debug;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use async_trait::async_trait;
use dyn_clone::DynClone;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cluster::ClusterVerifier;
use crate::config::HarnessConfig;
use crate::container::{self, ContainerController};
use crate::errors::{HarnessError, Result};
use crate::session::Session;

pub type AsyncScenarioFunc = fn(
    &mut Scenario,
) -> Pin<
    Box<
        dyn Future<Output = Result<()>> // future API / pollable
            + Send // required by non-single-threaded executors
            + '_,
    >,
>;

/// Per-scenario execution context: the configuration, the lifecycle
/// controller tracking everything the scenario creates, and the
/// deterministically derived names.
pub struct Scenario {
    name: String,
    pub config: HarnessConfig,
    pub containers: ContainerController,
}

impl Scenario {
    pub fn new(name: impl Into<String>, config: HarnessConfig) -> Self {
        let name = name.into();
        let containers = ContainerController::new(config.clone());
        Scenario {
            name,
            config,
            containers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scenario's primary container name.
    pub fn container_name(&self) -> String {
        container::container_name(&self.name)
    }

    /// Opens a digest session against a management port on the local host
    /// using the configured admin credentials.
    pub fn admin_session(&self, port: u16) -> Result<Session> {
        Session::open(format!("http://localhost:{port}"), self.config.admin.clone())
    }

    pub fn verifier(&self, port: u16) -> Result<ClusterVerifier> {
        Ok(ClusterVerifier::new(
            self.admin_session(port)?,
            self.config.retry,
        ))
    }

    /// Force-removes everything this scenario created; failures are
    /// returned for reporting, not swallowed.
    pub async fn teardown(&mut self) -> Vec<HarnessError> {
        self.containers.teardown_all().await
    }
}

/// Outcome of one scenario.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub pass: bool,
    pub details: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SuiteReport {
    pub name: String,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(|scenario| scenario.pass)
    }
}

#[async_trait]
pub trait Runnable: DynClone + Send + Sync {
    /// Runs the scenario under the given config. Returns `None` when the
    /// configured pattern filters it out.
    async fn run_scenario(&self, config: HarnessConfig, suite: &str) -> Option<ScenarioReport>;
}

impl Debug for dyn Runnable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Runnable")
    }
}

dyn_clone::clone_trait_object!(Runnable);

/// Description of a scenario suite.
#[derive(Clone, Debug)]
pub struct Suite {
    pub name: String,
    pub description: String,
    pub scenarios: Vec<Box<dyn Runnable>>,
}

impl Suite {
    pub fn add<T: Runnable + 'static>(&mut self, scenario: T) {
        self.scenarios.push(Box::new(scenario))
    }
}

#[derive(Clone)]
pub struct ScenarioSpec {
    // These fields are displayed in logs and reports. Be sure to add
    // a meaningful description here.
    pub name: String,
    pub description: String,
    // If always_run is true, the scenario runs even if the name does not
    // match the configured pattern. Useful for scenarios that stand up a
    // container other scenarios assert against.
    pub always_run: bool,
    // Invoked when the scenario executes.
    pub run: AsyncScenarioFunc,
}

#[async_trait]
impl Runnable for ScenarioSpec {
    async fn run_scenario(&self, config: HarnessConfig, suite: &str) -> Option<ScenarioReport> {
        if let Some(matcher) = config.matcher.clone() {
            if !self.always_run && !matcher.matches(suite, &self.name) {
                return None;
            }
        }

        let name = self.name.clone();
        let description = self.description.clone();
        let func = self.run;
        let joined = tokio::spawn(async move {
            info!(scenario = %name, %description, "starting");
            let mut scenario = Scenario::new(&name, config);

            let outcome = AssertUnwindSafe((func)(&mut scenario)).catch_unwind().await;
            let (pass, mut details) = match outcome {
                Ok(Ok(())) => (true, String::new()),
                Ok(Err(err)) => (false, err.to_string()),
                Err(payload) => (false, panic_message(payload)),
            };

            // teardown runs regardless of the outcome above
            for failure in scenario.teardown().await {
                warn!(scenario = %name, %failure, "teardown failure");
                if !details.is_empty() {
                    details.push_str("; ");
                }
                details.push_str(&format!("teardown: {failure}"));
            }

            ScenarioReport { name, pass, details }
        })
        .await;

        Some(match joined {
            Ok(report) => report,
            Err(join_err) => ScenarioReport {
                name: self.name.clone(),
                pass: false,
                details: panic_message(join_err.into_panic()),
            },
        })
    }
}

/// Renders a panic payload: string payloads verbatim, anything else via
/// Debug.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        format!("?{:?}", payload)
    }
}

/// Runs every suite sequentially, honoring the configured pattern filter,
/// and returns one report per suite that ran.
pub async fn run_suites(config: HarnessConfig, suites: Vec<Suite>) -> Vec<SuiteReport> {
    let mut reports = Vec::with_capacity(suites.len());
    for suite in suites {
        if let Some(matcher) = config.matcher.clone() {
            if !matcher.matches(&suite.name, "") {
                continue;
            }
        }
        info!(suite = %suite.name, "running suite");

        let mut report = SuiteReport {
            name: suite.name.clone(),
            scenarios: Vec::new(),
        };
        for scenario in &suite.scenarios {
            if let Some(outcome) = scenario.run_scenario(config.clone(), &suite.name).await {
                if outcome.pass {
                    info!(scenario = %outcome.name, "passed");
                } else {
                    error!(scenario = %outcome.name, details = %outcome.details, "failed");
                }
                report.scenarios.push(outcome);
            }
        }
        reports.push(report);
    }
    reports
}

/// True when every scenario in every suite passed.
pub fn all_passed(reports: &[SuiteReport]) -> bool {
    reports.iter().all(SuiteReport::passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dyn_scenario;
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_config() -> HarnessConfig {
        HarnessConfig {
            image: "clusterdb:test".to_string(),
            upgrade_image: "clusterdb:test-next".to_string(),
            license_key: String::new(),
            licensee: "none".to_string(),
            admin: crate::session::Credentials::new("test_admin", "test_admin_pass"),
            engine: "docker".to_string(),
            results_dir: PathBuf::from("test-results"),
            process_timeout: Duration::from_secs(5),
            retry: crate::retry::RetryPolicy::new(
                Duration::from_millis(50),
                Duration::from_millis(10),
            ),
            matcher: None,
        }
    }

    dyn_scenario! {
        async fn passing_scenario<'a>(_scenario: &'a mut Scenario) {
            Ok(())
        }
    }

    dyn_scenario! {
        async fn failing_scenario<'a>(_scenario: &'a mut Scenario) {
            Err(HarnessError::assertion("host count", 3, 1))
        }
    }

    dyn_scenario! {
        async fn panicking_scenario<'a>(_scenario: &'a mut Scenario) {
            panic!("scenario blew up");
        }
    }

    fn suite_of(name: &str, specs: Vec<ScenarioSpec>) -> Suite {
        let mut suite = Suite {
            name: name.to_string(),
            description: String::new(),
            scenarios: vec![],
        };
        for spec in specs {
            suite.add(spec);
        }
        suite
    }

    fn spec(name: &str, run: AsyncScenarioFunc) -> ScenarioSpec {
        ScenarioSpec {
            name: name.to_string(),
            description: String::new(),
            always_run: false,
            run,
        }
    }

    #[tokio::test]
    async fn reports_collect_pass_fail_and_panic() {
        let suite = suite_of(
            "unit",
            vec![
                spec("passes", passing_scenario),
                spec("fails", failing_scenario),
                spec("panics", panicking_scenario),
            ],
        );
        let reports = run_suites(test_config(), vec![suite]).await;
        assert_eq!(reports.len(), 1);
        let outcomes = &reports[0].scenarios;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].pass);
        assert!(!outcomes[1].pass);
        assert!(outcomes[1].details.contains("host count"));
        assert!(!outcomes[2].pass);
        assert!(outcomes[2].details.contains("blew up"));
        assert!(!all_passed(&reports));
    }

    #[tokio::test]
    async fn pattern_filter_skips_unmatched_scenarios() {
        let mut config = test_config();
        config.matcher =
            Some(crate::ScenarioMatcher::new("unit/passes").expect("valid pattern"));
        let suite = suite_of(
            "unit",
            vec![
                spec("passes", passing_scenario),
                spec("fails", failing_scenario),
            ],
        );
        let reports = run_suites(config, vec![suite]).await;
        assert_eq!(reports[0].scenarios.len(), 1);
        assert!(all_passed(&reports));
    }

    #[tokio::test]
    async fn always_run_bypasses_the_filter() {
        let mut config = test_config();
        config.matcher = Some(crate::ScenarioMatcher::new("unit/nothing").expect("valid"));
        let mut suite = suite_of("unit", vec![]);
        suite.add(ScenarioSpec {
            name: "setup".to_string(),
            description: String::new(),
            always_run: true,
            run: passing_scenario,
        });
        let reports = run_suites(config, vec![suite]).await;
        assert_eq!(reports[0].scenarios.len(), 1);
    }

    #[test]
    fn scenario_names_are_derived_from_the_scenario() {
        let scenario = Scenario::new("node reports ready", test_config());
        assert_eq!(scenario.container_name(), "nodereportsready");
    }
}
