//! Authenticated outbound transports.
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → AuthTransport::send
//!         ApiKey: buffer → fixed Authorization: Basic header
//!         Iam:    credentials → buffer → hash → SigV4 headers
//!     → Forward (HttpForwarder by default)
//!     → Response<Bytes>
//! ```
//!
//! # Design Decisions
//! - Exactly one scheme per instance, chosen at construction
//! - The forwarder is always injected; nothing wraps a global client
//! - Instances are long-lived and shared across concurrent calls; per-call
//!   state lives on the stack of `send`
//! - No internal retries

pub mod api_key;
pub mod credentials;
pub mod forward;
pub mod iam;
pub mod metadata;
pub mod profile;
pub mod sigv4;
pub mod sts;
pub mod types;

use axum::body::Body;
use axum::http::{Request, Response};
use bytes::Bytes;

use crate::config::TransportConfig;
use crate::observability::metrics;

pub use api_key::ApiKeyTransport;
pub use credentials::{
    CachedCredentials, CredentialsChain, EnvironmentCredentials, ProvideCredentials,
    SharedCredentials,
};
pub use metadata::{ContainerCredentials, InstanceMetadataCredentials};
pub use profile::{Profile, ProfileCredentials};
pub use forward::{Forward, HttpForwarder, SharedForward};
pub use iam::{AwsContext, IamTransport};
pub use sts::AssumeRoleProvider;
pub use types::{CredentialError, Credentials, TransportError, TransportResult};

/// An outbound transport that authenticates every request it forwards.
#[derive(Debug)]
pub enum AuthTransport {
    ApiKey(ApiKeyTransport),
    Iam(IamTransport),
}

impl AuthTransport {
    /// Build the configured scheme. The signed variant resolves ambient
    /// credentials through the default chain.
    pub async fn from_config(config: &TransportConfig, inner: SharedForward) -> TransportResult<Self> {
        match config {
            TransportConfig::ApiKey(c) => Ok(AuthTransport::ApiKey(ApiKeyTransport::new(c, inner)?)),
            TransportConfig::Iam(c) => Ok(AuthTransport::Iam(IamTransport::connect(c, None, inner).await?)),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            AuthTransport::ApiKey(_) => "api_key",
            AuthTransport::Iam(_) => "iam",
        }
    }

    /// Endpoint this transport was configured for.
    pub fn url(&self) -> &str {
        match self {
            AuthTransport::ApiKey(t) => t.url(),
            AuthTransport::Iam(t) => t.url(),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TransportResult<Response<Bytes>> {
        let method = request.method().clone();
        let uri = request.uri().clone();

        let result = match self {
            AuthTransport::ApiKey(t) => t.send(request).await,
            AuthTransport::Iam(t) => t.send(request).await,
        };

        match &result {
            Ok(response) => {
                metrics::record_transport(self.scheme(), "ok");
                tracing::debug!(
                    scheme = self.scheme(),
                    method = %method,
                    uri = %uri,
                    status = response.status().as_u16(),
                    "Forwarded authenticated request"
                );
            }
            Err(e) => {
                metrics::record_transport(self.scheme(), "error");
                tracing::warn!(
                    scheme = self.scheme(),
                    method = %method,
                    uri = %uri,
                    error = %e,
                    "Authenticated request failed"
                );
            }
        }
        result
    }
}

impl From<ApiKeyTransport> for AuthTransport {
    fn from(t: ApiKeyTransport) -> Self {
        AuthTransport::ApiKey(t)
    }
}

impl From<IamTransport> for AuthTransport {
    fn from(t: IamTransport) -> Self {
        AuthTransport::Iam(t)
    }
}
