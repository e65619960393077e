//! Cluster-state assertions over the management API.
//!
//! Topology is never stored: every check re-queries the management
//! endpoints through one authenticated session and compares against the
//! expected literal, retrying until the cluster converges or the budget
//! runs out.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use tracing::info;

use crate::errors::{HarnessError, Result};
use crate::retry::{poll_until, RetryPolicy};
use crate::session::{ApiResponse, Session};

const HOSTS_STATUS_PATH: &str = "/manage/v2/hosts?view=status&format=json";
const GROUPS_PATH: &str = "/manage/v2/groups";
const EVAL_PATH: &str = "/v1/eval";

const CERT_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const CERT_END: &str = "-----END CERTIFICATE-----";

/// Reports the cluster's own idea of its UTC offset as a dayTimeDuration.
pub const TIMEZONE_QUERY: &str = "fn:timezone-from-dateTime(fn:current-dateTime())";

lazy_static! {
    // `--<token>` opens a body part, `--<token>--` closes the payload.
    // The server emits hex boundary tokens; keeping the class that tight
    // stops PEM framing lines (all dashes and letters) from matching.
    static ref BOUNDARY: Regex =
        Regex::new(r"(?m)^--[0-9a-f]{8,}(?:--)?\r?$").expect("boundary regex compiles");
}

pub struct ClusterVerifier {
    session: Session,
    policy: RetryPolicy,
}

impl ClusterVerifier {
    pub fn new(session: Session, policy: RetryPolicy) -> Self {
        ClusterVerifier { session, policy }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Total hosts currently known to the cluster, from the status view.
    pub async fn host_count(&self) -> Result<u64> {
        let response = self.session.get(HOSTS_STATUS_PATH).await?;
        total_hosts(&response.json()?)
    }

    /// Polls until the cluster reports exactly `expected` hosts. Queried
    /// before convergence completes this retries rather than failing.
    pub async fn assert_host_count(&self, expected: u64) -> Result<()> {
        info!(expected, "asserting cluster host count");
        poll_until(self.policy, |_| async move {
            let actual = self.host_count().await?;
            if actual == expected {
                Ok(())
            } else {
                Err(HarnessError::assertion("cluster host count", expected, actual))
            }
        })
        .await
    }

    /// Names of the groups configured on the cluster.
    pub async fn groups(&self) -> Result<Vec<String>> {
        let response = self.session.get(&format!("{GROUPS_PATH}?format=json")).await?;
        group_names(&response.json()?)
    }

    pub async fn create_group(&self, name: &str) -> Result<()> {
        info!(group = name, "creating group");
        let response = self
            .session
            .post_json(GROUPS_PATH, &json!({ "group-name": name }))
            .await?;
        expect_success("group creation", &response)
    }

    /// The group a host currently belongs to.
    pub async fn host_group(&self, host: &str) -> Result<String> {
        let response = self
            .session
            .get(&format!("/manage/v2/hosts/{host}/properties?format=json"))
            .await?;
        let body = response.json()?;
        body.get("group")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                HarnessError::UnexpectedResponse(format!(
                    "properties of host {host} carry no group name"
                ))
            })
    }

    /// Moves a host into a group; group membership changes propagate
    /// asynchronously, so pair this with `assert_host_group`.
    pub async fn assign_host_group(&self, host: &str, group: &str) -> Result<()> {
        info!(host, group, "assigning host to group");
        let response = self
            .session
            .put_json(
                &format!("/manage/v2/hosts/{host}/properties"),
                &json!({ "group": group }),
            )
            .await?;
        expect_success("host group assignment", &response)
    }

    pub async fn assert_host_group(&self, host: &str, expected: &str) -> Result<()> {
        poll_until(self.policy, |_| async move {
            let actual = self.host_group(host).await?;
            if actual == expected {
                Ok(())
            } else {
                Err(HarnessError::assertion(
                    format!("group of host {host}"),
                    expected,
                    actual,
                ))
            }
        })
        .await
    }

    pub async fn create_certificate_template(&self, template: &Value) -> Result<()> {
        let response = self
            .session
            .post_json("/manage/v2/certificate-templates", template)
            .await?;
        expect_success("certificate template creation", &response)
    }

    /// Points an app server's TLS configuration at a template by name.
    pub async fn assign_server_template(
        &self,
        server: &str,
        group: &str,
        template: &str,
    ) -> Result<()> {
        let response = self
            .session
            .put_json(
                &format!("/manage/v2/servers/{server}/properties?group-id={group}"),
                &json!({ "ssl-certificate-template": template }),
            )
            .await?;
        expect_success("server certificate-template assignment", &response)
    }

    /// Runs a server-side script; the raw (typically multipart) response is
    /// returned for the caller's own extraction.
    pub async fn eval(&self, query: &str) -> Result<ApiResponse> {
        self.session.post_form(EVAL_PATH, &[("xquery", query)]).await
    }

    /// Runs an eval query expected to yield a single scalar and strips the
    /// multipart framing around it.
    pub async fn eval_scalar(&self, query: &str) -> Result<String> {
        let response = self.eval(query).await?;
        extract_scalar(&response.body)
    }

    /// Runs an eval query expected to yield exactly one PEM-encoded
    /// certificate and extracts it from the multipart body.
    pub async fn certificate(&self, query: &str) -> Result<String> {
        let response = self.eval(query).await?;
        extract_certificate(&response.body)
    }

    /// The cluster's own perceived UTC offset in duration notation.
    pub async fn reported_timezone(&self) -> Result<String> {
        self.eval_scalar(TIMEZONE_QUERY).await
    }
}

fn expect_success(context: &str, response: &ApiResponse) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(HarnessError::assertion(
            context,
            "2xx status",
            format!("{}: {}", response.status, response.body),
        ))
    }
}

/// Pulls the total-host count out of the status view. The management API
/// has been observed to carry the value as either a number or a numeric
/// string, so both are accepted.
fn total_hosts(body: &Value) -> Result<u64> {
    let value = &body["host-status-list"]["status-list-summary"]["total-hosts"]["value"];
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|raw| raw.parse().ok()))
        .ok_or_else(|| {
            HarnessError::UnexpectedResponse(
                "host status view carries no usable total-hosts value".to_string(),
            )
        })
}

fn group_names(body: &Value) -> Result<Vec<String>> {
    let items = &body["group-default-list"]["list-items"]["list-item"];
    let items = items.as_array().ok_or_else(|| {
        HarnessError::UnexpectedResponse("group list view carries no list items".to_string())
    })?;
    Ok(items
        .iter()
        .filter_map(|item| item["nameref"].as_str())
        .map(str::to_string)
        .collect())
}

/// Splits a multipart payload on its boundary-delimiter lines, returning
/// the body parts with their part headers stripped.
fn multipart_parts(body: &str) -> Vec<String> {
    BOUNDARY
        .split(body)
        .map(|part| {
            // part headers end at the first blank line
            let payload = part
                .split_once("\r\n\r\n")
                .or_else(|| part.split_once("\n\n"))
                .map(|(_, payload)| payload)
                .unwrap_or(part);
            payload.trim().to_string()
        })
        .filter(|payload| !payload.is_empty())
        .collect()
}

/// The documented contract is a single scalar per response; extra parts
/// are a format error, not a first-match pick.
fn extract_scalar(body: &str) -> Result<String> {
    let parts = multipart_parts(body);
    match parts.as_slice() {
        [single] => Ok(single.clone()),
        [] => Err(HarnessError::UnexpectedResponse(
            "eval response carries no body part".to_string(),
        )),
        many => Err(HarnessError::UnexpectedResponse(format!(
            "eval response carries {} body parts, expected one",
            many.len()
        ))),
    }
}

/// Extracts exactly one PEM certificate from a multipart payload. More
/// than one part or more than one certificate is a format error.
fn extract_certificate(body: &str) -> Result<String> {
    let payload = extract_scalar(body)?;
    if payload.matches(CERT_BEGIN).count() != 1 {
        return Err(HarnessError::UnexpectedResponse(
            "eval response does not carry exactly one certificate".to_string(),
        ));
    }
    let begin = payload
        .find(CERT_BEGIN)
        .ok_or_else(|| HarnessError::UnexpectedResponse("certificate marker missing".to_string()))?;
    let end = payload.find(CERT_END).ok_or_else(|| {
        HarnessError::UnexpectedResponse("certificate end marker missing".to_string())
    })?;
    if end < begin {
        return Err(HarnessError::UnexpectedResponse(
            "certificate markers are out of order".to_string(),
        ));
    }
    Ok(payload[begin..end + CERT_END.len()].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_hosts_accepts_number_and_numeric_string() {
        let numeric = json!({
            "host-status-list": {
                "status-list-summary": { "total-hosts": { "value": 3 } }
            }
        });
        assert_eq!(total_hosts(&numeric).expect("numeric form"), 3);

        let stringly = json!({
            "host-status-list": {
                "status-list-summary": { "total-hosts": { "value": "3" } }
            }
        });
        assert_eq!(total_hosts(&stringly).expect("string form"), 3);

        let broken = json!({ "host-status-list": {} });
        assert!(matches!(
            total_hosts(&broken),
            Err(HarnessError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn group_names_come_from_the_default_list() {
        let body = json!({
            "group-default-list": {
                "list-items": {
                    "list-item": [
                        { "nameref": "Default", "uriref": "/manage/v2/groups/Default" },
                        { "nameref": "dr-group", "uriref": "/manage/v2/groups/dr-group" }
                    ]
                }
            }
        });
        assert_eq!(
            group_names(&body).expect("well-formed list"),
            vec!["Default".to_string(), "dr-group".to_string()]
        );
    }

    const SCALAR_BODY: &str = "--6a5df7d535c71968\r\nContent-Type: text/plain\r\nX-Primitive: dayTimeDuration\r\n\r\n-PT3H30M\r\n--6a5df7d535c71968--\r\n";

    #[test]
    fn scalar_extraction_strips_multipart_framing() {
        assert_eq!(extract_scalar(SCALAR_BODY).expect("one part"), "-PT3H30M");
    }

    #[test]
    fn extra_body_parts_are_a_format_error() {
        let body = "--ab12cd34\r\nContent-Type: text/plain\r\n\r\nfirst\r\n--ab12cd34\r\nContent-Type: text/plain\r\n\r\nsecond\r\n--ab12cd34--\r\n";
        assert!(matches!(
            extract_scalar(body),
            Err(HarnessError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn certificate_extraction_keeps_the_pem_block_only() {
        let body = format!(
            "--deadbeef01\r\nContent-Type: text/plain\r\n\r\n{CERT_BEGIN}\nMIIBszCCARygAwIBAgIJ\n{CERT_END}\r\n--deadbeef01--\r\n"
        );
        let pem = extract_certificate(&body).expect("single certificate");
        assert!(pem.starts_with(CERT_BEGIN));
        assert!(pem.ends_with(CERT_END));
        assert!(!pem.contains("deadbeef01"));
    }

    #[test]
    fn pem_framing_lines_are_not_mistaken_for_boundaries() {
        let body = format!(
            "--deadbeef01\r\n\r\n{CERT_BEGIN}\nAAA\n{CERT_END}\r\n--deadbeef01--\r\n"
        );
        // the all-dash PEM markers survive the split as one part
        let pem = extract_certificate(&body).expect("single certificate");
        assert!(pem.contains("AAA"));
    }

    #[test]
    fn two_certificates_in_one_part_are_rejected() {
        let body = format!(
            "--ab12cd34\r\n\r\n{CERT_BEGIN}\nAAA\n{CERT_END}\n{CERT_BEGIN}\nBBB\n{CERT_END}\r\n--ab12cd34--\r\n"
        );
        assert!(matches!(
            extract_certificate(&body),
            Err(HarnessError::UnexpectedResponse(_))
        ));
    }
}
