#![warn(clippy::unwrap_used)]
mod cluster;
mod compose;
mod config;
mod container;
pub mod errors;
mod macros;
mod pattern;
mod process;
mod retry;
mod scenario;
mod scenariomatch;
mod session;
pub mod timezone;

pub use cluster::ClusterVerifier;
pub use compose::ComposeStack;
pub use config::HarnessConfig;
pub use container::{
    container_name, ContainerController, ContainerOptions, PortMapping, HEALTH_PORT, MANAGE_PORT,
    READY_MARKER, SECONDARY_SUFFIX,
};
pub use errors::{HarnessError, Result};
pub use pattern::{assert_glob, assert_regex, matches_glob, matches_regex};
pub use process::{ExitResult, ProcessRunner};
pub use retry::{poll_until, RetryPolicy};
pub use scenario::{
    all_passed, run_suites, AsyncScenarioFunc, Runnable, Scenario, ScenarioReport, ScenarioSpec,
    Suite, SuiteReport,
};
pub use scenariomatch::ScenarioMatcher;
pub use session::{unauthenticated_get, ApiResponse, Credentials, Session};
