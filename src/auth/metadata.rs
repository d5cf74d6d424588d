//! Credentials served over HTTP by the compute platform.
//!
//! # Responsibilities
//! - Container credentials from `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` or
//!   `AWS_CONTAINER_CREDENTIALS_FULL_URI`, with an optional authorization token
//! - Instance metadata: IMDSv2 session token, attached role, role credentials
//!
//! # Design Decisions
//! - Both endpoints answer with the same JSON document
//! - An unreachable metadata service is `NotLoaded`, so a default chain moves
//!   on instead of failing; off-instance hosts hit this on every lookup
//! - Every lookup carries its own short timeout on top of the forwarder's

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, Method, Request};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::auth::credentials::{non_empty_env, ProvideCredentials};
use crate::auth::forward::SharedForward;
use crate::auth::types::{CredentialError, Credentials};

pub const ENV_CONTAINER_RELATIVE_URI: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";
pub const ENV_CONTAINER_FULL_URI: &str = "AWS_CONTAINER_CREDENTIALS_FULL_URI";
pub const ENV_CONTAINER_TOKEN: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN";
pub const ENV_CONTAINER_TOKEN_FILE: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE";
pub const CONTAINER_HOST: &str = "http://169.254.170.2";

pub const ENV_IMDS_DISABLED: &str = "AWS_EC2_METADATA_DISABLED";
pub const ENV_IMDS_ENDPOINT: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT";
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254";

const IMDS_TOKEN_PATH: &str = "/latest/api/token";
const IMDS_CREDENTIALS_PATH: &str = "/latest/meta-data/iam/security-credentials/";
const IMDS_TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const IMDS_TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const IMDS_TOKEN_TTL_SECS: &str = "21600";

const IMDS_TIMEOUT: Duration = Duration::from_secs(1);
const CONTAINER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EndpointCredentials {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expiration: Option<String>,
}

/// Parse the credential document served by container and instance endpoints.
pub fn parse_endpoint_credentials(body: &[u8]) -> Result<Credentials, CredentialError> {
    let doc: EndpointCredentials = serde_json::from_slice(body)
        .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

    let mut creds = Credentials::new(doc.access_key_id, doc.secret_access_key);
    if let Some(token) = doc.token.filter(|t| !t.is_empty()) {
        creds = creds.with_session_token(token);
    }
    if let Some(expiration) = doc.expiration {
        let expiry = DateTime::parse_from_rfc3339(&expiration).map_err(|e| {
            CredentialError::InvalidResponse(format!("bad expiration {:?}: {}", expiration, e))
        })?;
        creds = creds.with_expiry(expiry.with_timezone(&Utc));
    }
    Ok(creds)
}

/// Send one lookup, bounded by `timeout`. The error is a plain reason.
async fn fetch(
    forward: &SharedForward,
    request: Request<Bytes>,
    timeout: Duration,
) -> Result<Bytes, String> {
    let response = match tokio::time::timeout(timeout, forward.forward(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(e.to_string()),
        Err(_) => return Err(format!("no reply within {:?}", timeout)),
    };

    if !response.status().is_success() {
        return Err(format!("endpoint returned {}", response.status()));
    }
    Ok(response.into_body())
}

/// Credentials from the container credentials endpoint.
#[derive(Debug)]
pub struct ContainerCredentials {
    forward: SharedForward,
    endpoint: Option<String>,
    token: Option<String>,
}

impl ContainerCredentials {
    pub fn new(forward: SharedForward, endpoint: Option<String>) -> Self {
        Self {
            forward,
            endpoint,
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Endpoint and token from the container environment variables.
    pub fn from_env(forward: SharedForward) -> Self {
        let endpoint = non_empty_env(ENV_CONTAINER_RELATIVE_URI)
            .map(|path| format!("{}{}", CONTAINER_HOST, path))
            .or_else(|| non_empty_env(ENV_CONTAINER_FULL_URI));

        let token = non_empty_env(ENV_CONTAINER_TOKEN_FILE)
            .and_then(|path| match std::fs::read_to_string(&path) {
                Ok(token) => Some(token.trim().to_string()),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Cannot read container token file");
                    None
                }
            })
            .or_else(|| non_empty_env(ENV_CONTAINER_TOKEN));

        Self::new(forward, endpoint).with_token(token)
    }
}

#[async_trait]
impl ProvideCredentials for ContainerCredentials {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Err(CredentialError::NotLoaded(
                "no container credentials endpoint configured".into(),
            ));
        };

        let mut builder = Request::builder().method(Method::GET).uri(endpoint);
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, token.as_str());
        }
        let request = builder
            .body(Bytes::new())
            .map_err(|e| CredentialError::Endpoint(format!("{}: {}", endpoint, e)))?;

        let body = fetch(&self.forward, request, CONTAINER_TIMEOUT)
            .await
            .map_err(|reason| CredentialError::Endpoint(format!("{}: {}", endpoint, reason)))?;

        let creds = parse_endpoint_credentials(&body)?;
        tracing::debug!(endpoint = %endpoint, expiry = ?creds.expiry, "Container credentials loaded");
        Ok(creds)
    }
}

/// Credentials for the role attached to the current instance.
#[derive(Debug)]
pub struct InstanceMetadataCredentials {
    forward: SharedForward,
    endpoint: String,
    disabled: bool,
}

impl InstanceMetadataCredentials {
    pub fn new(forward: SharedForward) -> Self {
        Self {
            forward,
            endpoint: IMDS_ENDPOINT.to_string(),
            disabled: false,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Honors `AWS_EC2_METADATA_DISABLED` and `AWS_EC2_METADATA_SERVICE_ENDPOINT`.
    pub fn from_env(forward: SharedForward) -> Self {
        let mut provider = Self::new(forward);
        if let Some(endpoint) = non_empty_env(ENV_IMDS_ENDPOINT) {
            provider = provider.with_endpoint(endpoint);
        }
        provider.disabled = non_empty_env(ENV_IMDS_DISABLED)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        provider
    }

    async fn session_token(&self) -> Result<String, CredentialError> {
        let request = Request::builder()
            .method(Method::PUT)
            .uri(format!("{}{}", self.endpoint, IMDS_TOKEN_PATH))
            .header(IMDS_TOKEN_TTL_HEADER, IMDS_TOKEN_TTL_SECS)
            .body(Bytes::new())
            .map_err(|e| CredentialError::Endpoint(e.to_string()))?;

        let body = fetch(&self.forward, request, IMDS_TIMEOUT).await.map_err(|reason| {
            CredentialError::NotLoaded(format!("instance metadata unavailable: {}", reason))
        })?;
        Ok(String::from_utf8_lossy(&body).trim().to_string())
    }

    async fn get(&self, path: &str, token: &str) -> Result<Bytes, CredentialError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("{}{}", self.endpoint, path))
            .header(IMDS_TOKEN_HEADER, token)
            .body(Bytes::new())
            .map_err(|e| CredentialError::Endpoint(e.to_string()))?;

        fetch(&self.forward, request, IMDS_TIMEOUT)
            .await
            .map_err(|reason| CredentialError::NotLoaded(format!("{}: {}", path, reason)))
    }
}

#[async_trait]
impl ProvideCredentials for InstanceMetadataCredentials {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError> {
        if self.disabled {
            return Err(CredentialError::NotLoaded("instance metadata disabled".into()));
        }

        let token = self.session_token().await?;

        let roles = self.get(IMDS_CREDENTIALS_PATH, &token).await?;
        let roles = String::from_utf8_lossy(&roles);
        let role = roles
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| CredentialError::NotLoaded("no role attached to instance".into()))?;

        let body = self
            .get(&format!("{}{}", IMDS_CREDENTIALS_PATH, role), &token)
            .await?;
        let creds = parse_endpoint_credentials(&body)?;
        tracing::debug!(role = %role, expiry = ?creds.expiry, "Instance credentials loaded");
        Ok(creds)
    }
}
