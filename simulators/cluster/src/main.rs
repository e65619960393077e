#![warn(clippy::unwrap_used)]

mod suites;

use dbsim::{all_passed, run_suites, HarnessConfig, ScenarioSpec, Suite};

use crate::suites::multi_node::{
    cluster_converges_to_three_hosts, cluster_survives_restart, host_joins_new_group,
};
use crate::suites::security::{certificate_template_round_trip, malformed_template_is_rejected};
use crate::suites::single_node::{
    invalid_license_is_reported, node_reports_configured_timezone, node_reports_ready,
    unauthenticated_request_is_challenged,
};
use crate::suites::upgrade::data_survives_upgrade;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut single_node = Suite {
        name: "single-node".to_string(),
        description: "Launches one node and verifies readiness, authentication,
        and timezone behavior against its logs and management API."
            .to_string(),
        scenarios: vec![],
    };

    single_node.add(ScenarioSpec {
        name: "node reports ready".to_string(),
        description: "The readiness marker appears and the management API answers.".to_string(),
        always_run: false,
        run: node_reports_ready,
    });

    single_node.add(ScenarioSpec {
        name: "invalid license is reported".to_string(),
        description: "A node with a bad license fails and names the cause in its logs."
            .to_string(),
        always_run: false,
        run: invalid_license_is_reported,
    });

    single_node.add(ScenarioSpec {
        name: "unauthenticated request is challenged".to_string(),
        description: "The management API answers credential-less requests with a digest challenge."
            .to_string(),
        always_run: false,
        run: unauthenticated_request_is_challenged,
    });

    single_node.add(ScenarioSpec {
        name: "node reports configured timezone".to_string(),
        description: "The cluster-reported offset matches the container's zone.".to_string(),
        always_run: false,
        run: node_reports_configured_timezone,
    });

    let mut multi_node = Suite {
        name: "multi-node".to_string(),
        description: "Brings up a three-node compose stack and asserts cluster
        topology through the management API."
            .to_string(),
        scenarios: vec![],
    };

    multi_node.add(ScenarioSpec {
        name: "cluster converges to three hosts".to_string(),
        description: "All declared services join and the host count settles at three."
            .to_string(),
        always_run: false,
        run: cluster_converges_to_three_hosts,
    });

    multi_node.add(ScenarioSpec {
        name: "host joins new group".to_string(),
        description: "A freshly created group receives a host and reports it.".to_string(),
        always_run: false,
        run: host_joins_new_group,
    });

    multi_node.add(ScenarioSpec {
        name: "cluster survives restart".to_string(),
        description: "Restarting the stack leaves the reported topology unchanged.".to_string(),
        always_run: false,
        run: cluster_survives_restart,
    });

    let mut security = Suite {
        name: "security".to_string(),
        description: "Certificate-template lifecycle against one node.".to_string(),
        scenarios: vec![],
    };

    security.add(ScenarioSpec {
        name: "certificate template round trip".to_string(),
        description: "A posted template yields an extractable PEM certificate.".to_string(),
        always_run: false,
        run: certificate_template_round_trip,
    });

    security.add(ScenarioSpec {
        name: "malformed template is rejected".to_string(),
        description: "A template without a name is refused with a diagnostic.".to_string(),
        always_run: false,
        run: malformed_template_is_rejected,
    });

    let mut upgrade = Suite {
        name: "upgrade".to_string(),
        description: "Two product versions side by side over one persistent volume."
            .to_string(),
        scenarios: vec![],
    };

    upgrade.add(ScenarioSpec {
        name: "data survives upgrade".to_string(),
        description: "The upgrade image serves from the primary's volume.".to_string(),
        always_run: false,
        run: data_survives_upgrade,
    });

    let config = HarnessConfig::from_env();
    let reports = run_suites(config, vec![single_node, multi_node, security, upgrade]).await;

    for suite in &reports {
        for scenario in &suite.scenarios {
            let verdict = if scenario.pass { "pass" } else { "FAIL" };
            println!("[{verdict}] {}/{}", suite.name, scenario.name);
        }
    }

    if !all_passed(&reports) {
        std::process::exit(1);
    }
}
