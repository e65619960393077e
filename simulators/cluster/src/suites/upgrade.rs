//! Upgrade scenario: two product versions run side by side against the
//! same named volume, primary first, then the `-2` secondary on the
//! upgrade image.

use dbsim::{dyn_scenario, ContainerOptions, HarnessError, PortMapping, Scenario, MANAGE_PORT};

dyn_scenario! {
    /// Seeds a volume-backed primary, stops it, stands the secondary up on
    /// the upgrade image over the same volume, and requires the upgraded
    /// node to come back serving the management API.
    pub async fn data_survives_upgrade<'a>(scenario: &'a mut Scenario) {
        let name = scenario.container_name();
        let volume = format!("{name}-data");
        let opts = ContainerOptions {
            ports: vec![
                PortMapping::same(8000),
                PortMapping::same(8001),
                PortMapping::same(MANAGE_PORT),
            ],
            ..Default::default()
        };

        scenario
            .containers
            .create_with_volume(&name, &volume, &opts)
            .await?;
        scenario.containers.stop(&name).await?;

        // same volume, upgrade image, remapped ports so the stopped
        // primary's bindings cannot shadow a stale listener
        let upgraded_opts = ContainerOptions {
            ports: vec![
                PortMapping { host: 7100, container: 8000 },
                PortMapping { host: 7101, container: 8001 },
                PortMapping { host: 7102, container: MANAGE_PORT },
            ],
            ..Default::default()
        };
        let secondary = scenario
            .containers
            .create_upgrade(&name, &volume, &upgraded_opts)
            .await?;

        let session = scenario.admin_session(7102)?;
        let hosts = session.get("/manage/v2/hosts?format=json").await?;
        if !hosts.is_success() {
            return Err(HarnessError::assertion(
                format!("hosts query against upgraded node {secondary}"),
                "2xx status",
                format!("{}: {}", hosts.status, hosts.body),
            ));
        }

        // explicit teardown exercises the full delete path; anything left
        // over is reaped by the scenario teardown anyway
        scenario.containers.delete(&name, true).await?;
        scenario.containers.delete_volume(&volume).await
    }
}
