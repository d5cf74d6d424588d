//! Role assumption via the STS `AssumeRole` action.
//!
//! # Responsibilities
//! - Exchange base credentials for temporary role credentials
//! - Carry the optional external id constraint
//! - Parse the JSON form of the STS response
//!
//! The provider performs one exchange per call. Wrap it in
//! `CachedCredentials` so the exchange only repeats near expiry.

use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    Method, Request,
};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use url::form_urlencoded;

use async_trait::async_trait;

use crate::auth::credentials::{ProvideCredentials, SharedCredentials};
use crate::auth::forward::SharedForward;
use crate::auth::sigv4::{self, SigningParams};
use crate::auth::types::{CredentialError, Credentials};

pub const STS_SERVICE: &str = "sts";
pub const STS_API_VERSION: &str = "2011-06-15";
pub const DEFAULT_DURATION_SECS: u32 = 3600;

/// Default regional STS endpoint.
pub fn sts_endpoint(region: &str) -> String {
    format!("https://sts.{}.amazonaws.com/", region)
}

/// Credentials obtained by assuming a role.
#[derive(Debug)]
pub struct AssumeRoleProvider {
    base: SharedCredentials,
    forward: SharedForward,
    role_arn: String,
    external_id: Option<String>,
    session_name: String,
    region: String,
    endpoint: String,
    duration_secs: u32,
}

impl AssumeRoleProvider {
    pub fn new(
        base: SharedCredentials,
        forward: SharedForward,
        role_arn: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let region = region.into();
        Self {
            base,
            forward,
            role_arn: role_arn.into(),
            external_id: None,
            session_name: format!("cloud-rpc-gateway-{}", Utc::now().timestamp()),
            endpoint: sts_endpoint(&region),
            region,
            duration_secs: DEFAULT_DURATION_SECS,
        }
    }

    pub fn with_external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id.filter(|id| !id.is_empty());
        self
    }

    pub fn with_session_name(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = session_name.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_duration_secs(mut self, duration_secs: u32) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    fn form_body(&self) -> String {
        let duration = self.duration_secs.to_string();
        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("Action", "AssumeRole")
            .append_pair("Version", STS_API_VERSION)
            .append_pair("RoleArn", &self.role_arn)
            .append_pair("RoleSessionName", &self.session_name)
            .append_pair("DurationSeconds", &duration);
        if let Some(external_id) = &self.external_id {
            form.append_pair("ExternalId", external_id);
        }
        form.finish()
    }

    fn assume_role_error(&self, reason: impl std::fmt::Display) -> CredentialError {
        CredentialError::AssumeRole(format!("{}: {}", self.role_arn, reason))
    }
}

#[async_trait]
impl ProvideCredentials for AssumeRoleProvider {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError> {
        let base = self.base.provide_credentials().await?;

        let body = Bytes::from(self.form_body());
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.as_str())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
            .header(ACCEPT, "application/json")
            .body(body.clone())
            .map_err(|e| self.assume_role_error(e))?;

        let params = SigningParams {
            credentials: &base,
            region: &self.region,
            service: STS_SERVICE,
            time: Utc::now(),
        };
        sigv4::sign(&mut request, &sigv4::payload_hash(&body), &params)
            .map_err(|e| self.assume_role_error(e))?;

        tracing::debug!(role = %self.role_arn, endpoint = %self.endpoint, "Assuming role");
        let response = self
            .forward
            .forward(request)
            .await
            .map_err(|e| self.assume_role_error(e))?;

        if !response.status().is_success() {
            return Err(self.assume_role_error(format!(
                "STS returned {}: {}",
                response.status(),
                String::from_utf8_lossy(response.body())
            )));
        }

        let creds = parse_assume_role_response(response.body())?;
        tracing::info!(
            role = %self.role_arn,
            expiry = ?creds.expiry,
            "Role assumed"
        );
        Ok(creds)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleEnvelope {
    assume_role_response: AssumeRoleResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
    assume_role_result: AssumeRoleResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResult {
    credentials: StsCredentials,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: Expiration,
}

/// STS reports expiry as epoch seconds in JSON, RFC 3339 elsewhere.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Expiration {
    Epoch(f64),
    Text(String),
}

impl Expiration {
    fn to_datetime(&self) -> Result<DateTime<Utc>, CredentialError> {
        match self {
            Expiration::Epoch(secs) => Utc
                .timestamp_opt(*secs as i64, 0)
                .single()
                .ok_or_else(|| CredentialError::InvalidResponse(format!("bad expiration {}", secs))),
            Expiration::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    CredentialError::InvalidResponse(format!("bad expiration {:?}: {}", text, e))
                }),
        }
    }
}

/// Parse the JSON body of a successful `AssumeRole` call.
pub fn parse_assume_role_response(body: &[u8]) -> Result<Credentials, CredentialError> {
    let envelope: AssumeRoleEnvelope = serde_json::from_slice(body)
        .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;
    let sts = envelope.assume_role_response.assume_role_result.credentials;

    Ok(Credentials::new(sts.access_key_id, sts.secret_access_key)
        .with_session_token(sts.session_token)
        .with_expiry(sts.expiration.to_datetime()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::forward::Forward;
    use crate::auth::types::TransportResult;
    use axum::http::{header::AUTHORIZATION, Response, StatusCode};
    use std::sync::{Arc, Mutex};

    const STS_JSON: &str = r#"{
        "AssumeRoleResponse": {
            "AssumeRoleResult": {
                "AssumedRoleUser": {"Arn": "arn:aws:sts::123:assumed-role/r/s", "AssumedRoleId": "AROA:s"},
                "Credentials": {
                    "AccessKeyId": "ASIATEMP",
                    "SecretAccessKey": "tempsecret",
                    "SessionToken": "temptoken",
                    "Expiration": 1767225600
                }
            },
            "ResponseMetadata": {"RequestId": "req-1"}
        }
    }"#;

    /// Captures the request and replies with a canned response.
    #[derive(Debug)]
    struct CannedForward {
        status: StatusCode,
        body: &'static str,
        seen: Mutex<Vec<Request<Bytes>>>,
    }

    #[async_trait]
    impl Forward for CannedForward {
        async fn forward(&self, request: Request<Bytes>) -> TransportResult<Response<Bytes>> {
            self.seen.lock().unwrap().push(request);
            let mut resp = Response::new(Bytes::from_static(self.body.as_bytes()));
            *resp.status_mut() = self.status;
            Ok(resp)
        }
    }

    fn canned(status: StatusCode, body: &'static str) -> Arc<CannedForward> {
        Arc::new(CannedForward {
            status,
            body,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_parse_epoch_expiration() {
        let creds = parse_assume_role_response(STS_JSON.as_bytes()).unwrap();
        assert_eq!(creds.access_key_id, "ASIATEMP");
        assert_eq!(creds.session_token.as_deref(), Some("temptoken"));
        assert_eq!(creds.expiry.unwrap().timestamp(), 1767225600);
    }

    #[test]
    fn test_parse_rfc3339_expiration() {
        let body = STS_JSON.replace("1767225600", "\"2026-01-01T00:00:00Z\"");
        let creds = parse_assume_role_response(body.as_bytes()).unwrap();
        assert_eq!(creds.expiry.unwrap().timestamp(), 1767225600);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_assume_role_response(b"<xml/>").unwrap_err();
        assert!(matches!(err, CredentialError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_assume_role_request_shape() {
        let forward = canned(StatusCode::OK, STS_JSON);
        let provider = AssumeRoleProvider::new(
            Arc::new(Credentials::new("AKIDBASE", "basesecret")),
            forward.clone(),
            "arn:aws:iam::123456789012:role/mcp",
            "eu-west-1",
        )
        .with_external_id(Some("ext-42".into()))
        .with_session_name("test-session")
        .with_duration_secs(900);

        let creds = provider.provide_credentials().await.unwrap();
        assert_eq!(creds.access_key_id, "ASIATEMP");

        let seen = forward.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.uri(), "https://sts.eu-west-1.amazonaws.com/");
        assert_eq!(request.method(), Method::POST);

        let auth = request.headers()[AUTHORIZATION].to_str().unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDBASE/"));
        assert!(auth.contains("/eu-west-1/sts/aws4_request"));

        let form: Vec<(String, String)> = form_urlencoded::parse(request.body())
            .into_owned()
            .collect();
        assert!(form.contains(&("Action".into(), "AssumeRole".into())));
        assert!(form.contains(&("RoleArn".into(), "arn:aws:iam::123456789012:role/mcp".into())));
        assert!(form.contains(&("RoleSessionName".into(), "test-session".into())));
        assert!(form.contains(&("ExternalId".into(), "ext-42".into())));
        assert!(form.contains(&("DurationSeconds".into(), "900".into())));
    }

    #[tokio::test]
    async fn test_assume_role_without_external_id() {
        let forward = canned(StatusCode::OK, STS_JSON);
        let provider = AssumeRoleProvider::new(
            Arc::new(Credentials::new("AKIDBASE", "basesecret")),
            forward.clone(),
            "arn:aws:iam::123456789012:role/mcp",
            "us-east-1",
        )
        .with_external_id(Some(String::new()));

        provider.provide_credentials().await.unwrap();

        let seen = forward.seen.lock().unwrap();
        let form: Vec<(String, String)> = form_urlencoded::parse(seen[0].body())
            .into_owned()
            .collect();
        assert!(!form.iter().any(|(k, _)| k == "ExternalId"));
    }

    #[tokio::test]
    async fn test_assume_role_denied() {
        let forward = canned(StatusCode::FORBIDDEN, r#"{"Error":{"Code":"AccessDenied"}}"#);
        let provider = AssumeRoleProvider::new(
            Arc::new(Credentials::new("AKIDBASE", "basesecret")),
            forward,
            "arn:aws:iam::123456789012:role/mcp",
            "us-east-1",
        );

        let err = provider.provide_credentials().await.unwrap_err();
        match err {
            CredentialError::AssumeRole(msg) => assert!(msg.contains("AccessDenied")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
