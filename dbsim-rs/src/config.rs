//! Environment-derived harness configuration.
//!
//! Every lifecycle and session call receives this value explicitly — a
//! scenario constructs (or clones) its own config rather than reading
//! process-wide defaults, so nothing couples scenarios to each other.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::retry::RetryPolicy;
use crate::scenariomatch::ScenarioMatcher;
use crate::session::Credentials;

#[derive(Clone, Debug)]
pub struct HarnessConfig {
    /// Image under test.
    pub image: String,
    /// Image tag used by the upgrade-style secondary container.
    pub upgrade_image: String,
    pub license_key: String,
    pub licensee: String,
    pub admin: Credentials,
    /// Container engine CLI, `docker` unless overridden.
    pub engine: String,
    /// Where captured stdout/stderr and rendered compose files land.
    pub results_dir: PathBuf,
    /// Wall-clock budget for each external invocation.
    pub process_timeout: Duration,
    /// Budget and interval for every polled assertion.
    pub retry: RetryPolicy,
    /// Optional `suite/scenario` filter.
    pub matcher: Option<ScenarioMatcher>,
}

impl HarnessConfig {
    /// Reads `DBSIM_*` variables, falling back to defaults suitable for a
    /// local engine.
    pub fn from_env() -> Self {
        let matcher = match env::var("DBSIM_SCENARIO_PATTERN") {
            Ok(pattern) if !pattern.is_empty() => match ScenarioMatcher::new(&pattern) {
                Ok(matcher) => Some(matcher),
                Err(err) => {
                    warn!(%pattern, %err, "ignoring unusable scenario pattern");
                    None
                }
            },
            _ => None,
        };

        HarnessConfig {
            image: var_or("DBSIM_IMAGE", "clusterdb:latest"),
            upgrade_image: var_or("DBSIM_UPGRADE_IMAGE", "clusterdb:latest-preview"),
            license_key: var_or("DBSIM_LICENSE_KEY", ""),
            licensee: var_or("DBSIM_LICENSEE", "none"),
            admin: Credentials::new(
                var_or("DBSIM_ADMIN_USER", "test_admin"),
                var_or("DBSIM_ADMIN_PASSWORD", "test_admin_pass"),
            ),
            engine: var_or("DBSIM_ENGINE", "docker"),
            results_dir: PathBuf::from(var_or("DBSIM_RESULTS_DIR", "test-results")),
            process_timeout: Duration::from_secs(secs_or("DBSIM_PROCESS_TIMEOUT_SECS", 60)),
            retry: RetryPolicy::new(
                Duration::from_secs(secs_or("DBSIM_RETRY_TIMEOUT_SECS", 180)),
                Duration::from_secs(secs_or("DBSIM_RETRY_INTERVAL_SECS", 5)),
            ),
            matcher,
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn secs_or(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
