//! Multi-node scenarios over a rendered compose stack: convergence to the
//! expected host count, group membership, and restart survival.

use std::path::Path;

use dbsim::{dyn_scenario, HarnessError, Scenario, MANAGE_PORT};
use itertools::Itertools;
use tracing::info;

pub const THREE_NODE_TEMPLATE: &str = "templates/three-node.yaml";
const NODE_COUNT: u64 = 3;

dyn_scenario! {
    /// Brings up the three-node stack and waits for the cluster to report
    /// all of them — querying before convergence retries, it does not fail.
    pub async fn cluster_converges_to_three_hosts<'a>(scenario: &'a mut Scenario) {
        let credentials = scenario.config.admin.clone();
        let stack = scenario
            .containers
            .start_compose(Path::new(THREE_NODE_TEMPLATE), &credentials, true)
            .await?;
        info!(services = %stack.services.iter().join(", "), "stack is ready");

        scenario.verifier(MANAGE_PORT)?.assert_host_count(NODE_COUNT).await
    }
}

dyn_scenario! {
    /// Creates a fresh group and moves a secondary host into it; the
    /// membership assertion only becomes meaningful after the create.
    pub async fn host_joins_new_group<'a>(scenario: &'a mut Scenario) {
        let credentials = scenario.config.admin.clone();
        scenario
            .containers
            .start_compose(Path::new(THREE_NODE_TEMPLATE), &credentials, true)
            .await?;

        let verifier = scenario.verifier(MANAGE_PORT)?;
        verifier.assert_host_count(NODE_COUNT).await?;

        verifier.create_group("dr-group").await?;
        let groups = verifier.groups().await?;
        if !groups.iter().any(|group| group == "dr-group") {
            return Err(HarnessError::assertion(
                "configured groups",
                "list containing dr-group",
                groups.join(", "),
            ));
        }

        verifier.assign_host_group("node2", "dr-group").await?;
        verifier.assert_host_group("node2", "dr-group").await
    }
}

dyn_scenario! {
    /// Restarting the whole stack must not change the topology the
    /// management API reports once the nodes come back.
    pub async fn cluster_survives_restart<'a>(scenario: &'a mut Scenario) {
        let credentials = scenario.config.admin.clone();
        let stack = scenario
            .containers
            .start_compose(Path::new(THREE_NODE_TEMPLATE), &credentials, true)
            .await?;

        let verifier = scenario.verifier(MANAGE_PORT)?;
        verifier.assert_host_count(NODE_COUNT).await?;

        scenario.containers.restart_compose(&stack).await?;
        verifier.assert_host_count(NODE_COUNT).await
    }
}
