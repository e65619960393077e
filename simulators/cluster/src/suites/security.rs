//! Certificate-template scenarios: the round trip from template creation
//! to a PEM extracted out of an eval response, and the negative path for a
//! malformed template.

use dbsim::{
    assert_glob, dyn_scenario, ContainerOptions, HarnessError, PortMapping, Scenario, HEALTH_PORT,
    MANAGE_PORT,
};
use serde_json::json;

const TEMPLATE_NAME: &str = "harness-tls";

/// Yields the PEM of the certificate minted from the template.
const CERTIFICATE_QUERY: &str =
    r#"pki:template-certificate-authority(pki:template-by-name("harness-tls"))"#;

fn standard_ports() -> Vec<PortMapping> {
    vec![
        PortMapping::same(HEALTH_PORT),
        PortMapping::same(8000),
        PortMapping::same(8001),
        PortMapping::same(MANAGE_PORT),
    ]
}

dyn_scenario! {
    /// POSTs a template, points an app server at it, and extracts the
    /// resulting certificate out of the multipart eval response.
    pub async fn certificate_template_round_trip<'a>(scenario: &'a mut Scenario) {
        let name = scenario.container_name();
        let opts = ContainerOptions {
            ports: standard_ports(),
            ..Default::default()
        };
        scenario.containers.create(&name, &opts).await?;

        let verifier = scenario.verifier(MANAGE_PORT)?;
        verifier
            .create_certificate_template(&json!({
                "template-name": TEMPLATE_NAME,
                "template-description": "harness-issued template",
                "key-type": "rsa",
                "key-options": { "key-length": "2048" },
                "req": {
                    "version": "0",
                    "subject": { "countryName": "US", "organizationName": "Harness" }
                }
            }))
            .await?;
        verifier
            .assign_server_template("App-Services", "Default", TEMPLATE_NAME)
            .await?;

        let pem = verifier.certificate(CERTIFICATE_QUERY).await?;
        assert_glob(
            &pem,
            "-----BEGIN CERTIFICATE-----*-----END CERTIFICATE-----",
            "extracted certificate",
        )
    }
}

dyn_scenario! {
    /// A template without a name must be rejected; the scenario accepts
    /// whatever status comes back and asserts the failure itself.
    pub async fn malformed_template_is_rejected<'a>(scenario: &'a mut Scenario) {
        let name = scenario.container_name();
        let opts = ContainerOptions {
            ports: standard_ports(),
            ..Default::default()
        };
        scenario.containers.create(&name, &opts).await?;

        let session = scenario.admin_session(MANAGE_PORT)?;
        let response = session
            .post_json(
                "/manage/v2/certificate-templates",
                &json!({ "template-description": "missing its name" }),
            )
            .await?;
        if response.is_success() {
            return Err(HarnessError::assertion(
                "malformed template upload",
                "rejection status",
                response.status,
            ));
        }
        assert_glob(&response.body, "*template-name*", "rejection body")
    }
}
