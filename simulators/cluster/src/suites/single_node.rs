//! Single-node scenarios: readiness, the negative license path, the digest
//! challenge, and the timezone cross-check.

use dbsim::timezone::{current_zone_offset_notation, offset_notation, parse_numeric_offset};
use dbsim::{
    assert_glob, assert_regex, dyn_scenario, unauthenticated_get, ContainerOptions, HarnessError,
    PortMapping, Scenario, HEALTH_PORT, MANAGE_PORT,
};

const TEST_ZONE: &str = "America/St_Johns";

fn standard_ports() -> Vec<PortMapping> {
    vec![
        PortMapping::same(HEALTH_PORT),
        PortMapping::same(8000),
        PortMapping::same(8001),
        PortMapping::same(MANAGE_PORT),
    ]
}

dyn_scenario! {
    /// Launches one node and proves it is actually serving: the readiness
    /// marker appears in its logs, the health port answers, and the
    /// management API is reachable with the admin credentials.
    pub async fn node_reports_ready<'a>(scenario: &'a mut Scenario) {
        let name = scenario.container_name();
        let opts = ContainerOptions {
            ports: standard_ports(),
            ..Default::default()
        };
        scenario.containers.create(&name, &opts).await?;

        let health = unauthenticated_get(&format!("http://localhost:{HEALTH_PORT}/")).await?;
        if !health.is_success() {
            return Err(HarnessError::assertion(
                "health port response",
                "2xx status",
                health.status,
            ));
        }

        let session = scenario.admin_session(MANAGE_PORT)?;
        let hosts = session.get("/manage/v2/hosts?format=json").await?;
        if !hosts.is_success() {
            return Err(HarnessError::assertion(
                "authenticated hosts query",
                "2xx status",
                format!("{}: {}", hosts.status, hosts.body),
            ));
        }
        Ok(())
    }
}

dyn_scenario! {
    /// A node started without a usable license must fail, and must say why.
    /// Creation tolerates the failure; the log assertion is the check.
    pub async fn invalid_license_is_reported<'a>(scenario: &'a mut Scenario) {
        let name = scenario.container_name();
        let opts = ContainerOptions {
            env: vec![("LICENSE_KEY".to_string(), "not-a-license".to_string())],
            ..Default::default()
        };
        scenario.containers.create_failing(&name, &opts).await?;

        dbsim::poll_until(scenario.config.retry, |_| {
            let (containers, name) = (&scenario.containers, name.as_str());
            async move {
                let logs = containers.logs(name).await?;
                assert_regex(
                    &logs,
                    "(?i)invalid license",
                    &format!("logs of container {name}"),
                )
            }
        })
        .await
    }
}

dyn_scenario! {
    /// The management API must challenge a credential-less request rather
    /// than serve it.
    pub async fn unauthenticated_request_is_challenged<'a>(scenario: &'a mut Scenario) {
        let name = scenario.container_name();
        let opts = ContainerOptions {
            ports: standard_ports(),
            ..Default::default()
        };
        scenario.containers.create(&name, &opts).await?;

        let response =
            unauthenticated_get(&format!("http://localhost:{MANAGE_PORT}/manage/v2/hosts")).await?;
        if response.status != 401 {
            return Err(HarnessError::assertion(
                "unauthenticated hosts query",
                401,
                response.status,
            ));
        }
        assert_glob(
            &response.body,
            "*Unauthorized*",
            "unauthenticated response body",
        )
    }
}

dyn_scenario! {
    /// Starts a node pinned to a named zone, reads the offset the OS
    /// reports inside the container, and requires the cluster's own
    /// perceived offset to match it exactly — and to agree with the
    /// zone-database conversion.
    pub async fn node_reports_configured_timezone<'a>(scenario: &'a mut Scenario) {
        let name = scenario.container_name();
        let opts = ContainerOptions {
            ports: standard_ports(),
            env: vec![("TZ".to_string(), TEST_ZONE.to_string())],
            ..Default::default()
        };
        scenario.containers.create(&name, &opts).await?;

        let os_offset = scenario.containers.exec(&name, &["date", "+%z"]).await?;
        if !os_offset.success() {
            return Err(HarnessError::assertion(
                "date +%z inside the container",
                "exit status 0",
                format!("{:?}: {}", os_offset.status, os_offset.stderr),
            ));
        }
        let expected = offset_notation(parse_numeric_offset(os_offset.stdout.trim())?);

        let converted = current_zone_offset_notation(TEST_ZONE)?;
        if converted != expected {
            return Err(HarnessError::assertion(
                "zone-database offset conversion",
                &expected,
                converted,
            ));
        }

        let reported = scenario.verifier(MANAGE_PORT)?.reported_timezone().await?;
        if reported != expected {
            return Err(HarnessError::assertion(
                "cluster-reported timezone offset",
                expected,
                reported,
            ));
        }
        Ok(())
    }
}
