//! Authenticated transports against real sockets.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use chrono::NaiveDateTime;

use cloud_rpc_gateway::auth::sigv4::{self, SigningParams, EMPTY_PAYLOAD_SHA256};
use cloud_rpc_gateway::auth::{
    ApiKeyTransport, AuthTransport, AwsContext, CachedCredentials, ContainerCredentials,
    CredentialError, Credentials, CredentialsChain, HttpForwarder, IamTransport,
    ProvideCredentials, TransportError,
};
use cloud_rpc_gateway::config::{ApiKeyConfig, IamConfig};

use common::{start_mock_backend, start_recording_backend, sts_reply, RecordedRequest};

fn base_credentials() -> Credentials {
    Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
}

fn iam_config(url: String) -> IamConfig {
    IamConfig {
        url,
        region: Some("us-east-1".into()),
        ..Default::default()
    }
}

/// Recompute the signature a recorded request should carry.
fn expected_authorization(recorded: &RecordedRequest, credentials: &Credentials) -> String {
    let authorization = recorded.header("authorization").unwrap();
    let signed = authorization
        .split("SignedHeaders=")
        .nth(1)
        .and_then(|rest| rest.split(',').next())
        .unwrap();

    let host = recorded.header("host").unwrap();
    let mut builder = Request::builder()
        .method(recorded.method.as_str())
        .uri(format!("http://{}{}", host, recorded.target));
    for name in signed.split(';') {
        builder = builder.header(name, recorded.header(name).unwrap());
    }
    let mut request = builder.body(()).unwrap();

    let amz_date = recorded.header("x-amz-date").unwrap();
    let time = NaiveDateTime::parse_from_str(amz_date, "%Y%m%dT%H%M%SZ")
        .unwrap()
        .and_utc();

    let params = SigningParams {
        credentials,
        region: "us-east-1",
        service: "execute-api",
        time,
    };
    sigv4::sign(&mut request, &sigv4::payload_hash(&recorded.body), &params).unwrap();
    request.headers()["authorization"].to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_api_key_header_on_every_call() {
    let backend = start_mock_backend("{}").await;
    let config = ApiKeyConfig {
        url: backend.url(),
        access: "access".into(),
        secret: "secret".into(),
    };
    let transport = ApiKeyTransport::new(&config, HttpForwarder::shared()).unwrap();

    for i in 0..3 {
        let request = Request::post(format!("{}/mcp", backend.url()))
            .body(Body::from(format!("{{\"n\":{}}}", i)))
            .unwrap();
        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    let requests = backend.requests();
    assert_eq!(requests.len(), 3);
    for (i, request) in requests.iter().enumerate() {
        assert_eq!(request.header("authorization"), Some("Basic YWNjZXNzOnNlY3JldA"));
        assert_eq!(request.header_count("authorization"), 1);
        assert_eq!(request.body, format!("{{\"n\":{}}}", i).into_bytes());
    }
}

#[tokio::test]
async fn test_iam_body_forwarded_unchanged() {
    let backend = start_mock_backend("{}").await;
    let ambient = AwsContext::new("us-east-1", Arc::new(base_credentials()));
    let transport = IamTransport::connect(&iam_config(backend.url()), Some(ambient), HttpForwarder::shared())
        .await
        .unwrap();

    let body = br#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"x"}}"#;
    let request = Request::post(format!("{}/prod/mcp?stage=1", backend.url()))
        .header("content-type", "application/json")
        .body(Body::from(&body[..]))
        .unwrap();
    transport.send(request).await.unwrap();

    let recorded = &backend.requests()[0];
    assert_eq!(recorded.body, body.to_vec());
    assert_eq!(recorded.target, "/prod/mcp?stage=1");
    assert_eq!(recorded.header("host"), Some(backend.addr.to_string().as_str()));
    assert!(recorded.header("x-amz-security-token").is_none());
    assert_eq!(
        recorded.header("authorization").unwrap(),
        expected_authorization(recorded, &base_credentials())
    );
}

#[tokio::test]
async fn test_iam_empty_body_uses_empty_hash() {
    let backend = start_mock_backend("{}").await;
    let ambient = AwsContext::new("us-east-1", Arc::new(base_credentials()));
    let transport = IamTransport::connect(&iam_config(backend.url()), Some(ambient), HttpForwarder::shared())
        .await
        .unwrap();

    transport
        .send(Request::delete(format!("{}/session", backend.url())).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let recorded = &backend.requests()[0];
    assert!(recorded.body.is_empty());
    assert_eq!(sigv4::payload_hash(&recorded.body), EMPTY_PAYLOAD_SHA256);
    assert_eq!(
        recorded.header("authorization").unwrap(),
        expected_authorization(recorded, &base_credentials())
    );
}

#[tokio::test]
async fn test_iam_concurrent_calls_are_independent() {
    let backend = start_mock_backend("{}").await;
    let ambient = AwsContext::new("us-east-1", Arc::new(base_credentials()));
    let transport = Arc::new(
        IamTransport::connect(&iam_config(backend.url()), Some(ambient), HttpForwarder::shared())
            .await
            .unwrap(),
    );

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..16 {
        let transport = transport.clone();
        let url = format!("{}/call/{}", backend.url(), i);
        tasks.spawn(async move {
            let request = Request::post(url)
                .body(Body::from(format!("{{\"call\":{}}}", i)))
                .unwrap();
            transport.send(request).await.unwrap();
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    let requests = backend.requests();
    assert_eq!(requests.len(), 16);
    for recorded in &requests {
        let i = recorded.target.trim_start_matches("/call/");
        assert_eq!(recorded.body, format!("{{\"call\":{}}}", i).into_bytes());
        assert_eq!(
            recorded.header("authorization").unwrap(),
            expected_authorization(recorded, &base_credentials())
        );
    }
}

#[tokio::test]
async fn test_iam_role_assumed_once() {
    let sts = start_recording_backend(|_| (200, sts_reply("ASIAROLE", "role-token"))).await;
    let backend = start_mock_backend("{}").await;

    let config = IamConfig {
        role: Some("arn:aws:iam::123456789012:role/mcp".into()),
        external_id: Some("ext-7".into()),
        sts_endpoint: Some(format!("{}/", sts.url())),
        ..iam_config(backend.url())
    };
    let ambient = AwsContext::new("us-east-1", Arc::new(base_credentials()));
    let transport: AuthTransport = IamTransport::connect(&config, Some(ambient), HttpForwarder::shared())
        .await
        .unwrap()
        .into();
    assert_eq!(sts.request_count(), 1);

    for _ in 0..3 {
        transport
            .send(Request::post(backend.url()).body(Body::from("{}")).unwrap())
            .await
            .unwrap();
    }
    assert_eq!(sts.request_count(), 1);

    let exchange = &sts.requests()[0];
    let form = String::from_utf8(exchange.body.clone()).unwrap();
    assert!(form.contains("Action=AssumeRole"));
    assert!(form.contains("ExternalId=ext-7"));
    assert!(exchange.header("authorization").unwrap().contains("Credential=AKIDEXAMPLE/"));

    let role_credentials = Credentials::new("ASIAROLE", "rolesecret").with_session_token("role-token");
    for recorded in backend.requests() {
        assert_eq!(recorded.header("x-amz-security-token"), Some("role-token"));
        assert_eq!(
            recorded.header("authorization").unwrap(),
            expected_authorization(&recorded, &role_credentials)
        );
    }
}

#[derive(Debug)]
struct Unavailable;

#[async_trait::async_trait]
impl ProvideCredentials for Unavailable {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError> {
        Err(CredentialError::NotLoaded("no credentials".into()))
    }
}

#[tokio::test]
async fn test_credential_failure_never_reaches_network() {
    let backend = start_mock_backend("{}").await;
    let ambient = AwsContext::new("us-east-1", Arc::new(Unavailable));
    let transport = IamTransport::connect(&iam_config(backend.url()), Some(ambient), HttpForwarder::shared())
        .await
        .unwrap();

    let err = transport
        .send(Request::post(backend.url()).body(Body::from("{}")).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Credential(_)));
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_role_denied_fails_construction() {
    let sts = start_recording_backend(|_| (403, r#"{"Error":{"Code":"AccessDenied"}}"#.to_string())).await;
    let config = IamConfig {
        role: Some("arn:aws:iam::123456789012:role/mcp".into()),
        sts_endpoint: Some(sts.url()),
        ..iam_config("https://abc.execute-api.us-east-1.amazonaws.com/prod".into())
    };
    let ambient = AwsContext::new("us-east-1", Arc::new(base_credentials()));

    let err = IamTransport::connect(&config, Some(ambient), HttpForwarder::shared())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("AccessDenied"));
}

#[tokio::test]
async fn test_iam_signs_with_container_credentials() {
    let expiry = (chrono::Utc::now() + chrono::Duration::hours(6)).to_rfc3339();
    let metadata = start_recording_backend(move |request| {
        assert_eq!(request.header("authorization"), Some("task-token"));
        let body = format!(
            r#"{{"AccessKeyId":"ASIATASK","SecretAccessKey":"tasksecret","Token":"task-session","Expiration":"{}"}}"#,
            expiry
        );
        (200, body)
    })
    .await;
    let backend = start_mock_backend("{}").await;

    let forward = HttpForwarder::shared();
    let container = ContainerCredentials::new(forward.clone(), Some(format!("{}/v2/credentials/t1", metadata.url())))
        .with_token(Some("task-token".into()));
    let chain = CredentialsChain::new()
        .or_else("environment", Arc::new(Unavailable))
        .or_else("container", Arc::new(container));
    let ambient = AwsContext::new("us-east-1", Arc::new(CachedCredentials::new(Arc::new(chain))));

    let transport = IamTransport::connect(&iam_config(backend.url()), Some(ambient), forward)
        .await
        .unwrap();
    for _ in 0..2 {
        transport
            .send(Request::post(format!("{}/mcp", backend.url())).body(Body::from("{}")).unwrap())
            .await
            .unwrap();
    }

    assert_eq!(metadata.request_count(), 1);
    assert_eq!(metadata.requests()[0].target, "/v2/credentials/t1");

    let task_credentials = Credentials::new("ASIATASK", "tasksecret").with_session_token("task-session");
    for recorded in backend.requests() {
        assert_eq!(recorded.header("x-amz-security-token"), Some("task-session"));
        assert_eq!(
            recorded.header("authorization").unwrap(),
            expected_authorization(&recorded, &task_credentials)
        );
    }
}
