//! Digest-authenticated HTTP sessions against the management API.
//!
//! A `Session` is owned by the scenario that opened it and passed to each
//! call that needs it; nothing is registered process-wide, so concurrent
//! scenarios against different ports or credentials cannot interfere.
//!
//! Status codes are never validated here — callers accept any status from
//! the immediate call and assert on status/body themselves.

use std::path::Path;
use std::time::Duration;

use diqwest::WithDigestAuth;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Admin username + password. At most one authoritative source per value:
/// either inline or read from a secret file, never both.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reads both values from plaintext secret files, trimming trailing
    /// newlines the way secret mounts deliver them.
    pub fn from_secret_files(username_file: &Path, password_file: &Path) -> Result<Self> {
        let username = std::fs::read_to_string(username_file)?;
        let password = std::fs::read_to_string(password_file)?;
        Ok(Credentials::new(username.trim(), password.trim()))
    }
}

#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// One authenticated client bound to a base URL and a credential pair,
/// negotiating the digest challenge/response handshake on every request.
#[derive(Clone, Debug)]
pub struct Session {
    base_url: String,
    credentials: Credentials,
    client: Client,
}

impl Session {
    pub fn open(base_url: impl Into<String>, credentials: Credentials) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Session {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send("GET", path, self.client.get(self.url(path))).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.send("POST", path, self.client.post(self.url(path)).json(body))
            .await
    }

    pub async fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> Result<ApiResponse> {
        self.send("POST", path, self.client.post(self.url(path)).form(&fields))
            .await
    }

    pub async fn put_json(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.send("PUT", path, self.client.put(self.url(path)).json(body))
            .await
    }

    async fn send(&self, method: &str, path: &str, request: RequestBuilder) -> Result<ApiResponse> {
        debug!(method, path, base = %self.base_url, "management request");
        let response = request
            .send_with_digest_auth(&self.credentials.username, &self.credentials.password)
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }
}

/// Bare GET with no credentials attached, for challenge-indicator and
/// health-port checks.
pub async fn unauthenticated_get(url: &str) -> Result<ApiResponse> {
    let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let response = client.get(url).send().await?;
    let status = response.status().as_u16();
    let challenge = response
        .headers()
        .get(reqwest::header::WWW_AUTHENTICATE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let mut body = response.text().await?;
    // surface the challenge to body-level assertions; proxies sometimes
    // strip the default 401 page
    if let Some(challenge) = challenge {
        if body.is_empty() {
            body = challenge;
        }
    }
    Ok(ApiResponse { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HarnessError;

    #[test]
    fn url_joins_without_doubled_slashes() {
        let session = Session::open(
            "http://localhost:8002/",
            Credentials::new("admin", "admin"),
        )
        .expect("client builds");
        assert_eq!(
            session.url("/manage/v2/hosts"),
            "http://localhost:8002/manage/v2/hosts"
        );
    }

    #[test]
    fn secret_file_credentials_are_trimmed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let user = dir.path().join("user.txt");
        let pass = dir.path().join("pass.txt");
        std::fs::write(&user, "test_admin\n").expect("write");
        std::fs::write(&pass, "s3cret\n").expect("write");
        let creds = Credentials::from_secret_files(&user, &pass).expect("both files exist");
        assert_eq!(creds.username, "test_admin");
        assert_eq!(creds.password, "s3cret");
    }

    #[test]
    fn response_json_parses_on_demand() {
        let response = ApiResponse {
            status: 200,
            body: r#"{"group": "Default"}"#.to_string(),
        };
        assert!(response.is_success());
        let value = response.json().expect("valid json");
        assert_eq!(value["group"], "Default");
        assert!(matches!(
            ApiResponse {
                status: 200,
                body: "not json".to_string()
            }
            .json(),
            Err(HarnessError::Json(_))
        ));
    }
}
