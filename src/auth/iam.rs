//! Signed-request transport.
//!
//! # Data Flow
//! ```text
//! connect(config, ambient, inner)
//!     → ambient credentials (default chain unless supplied)
//!     → role set? AssumeRoleProvider wrapped in CachedCredentials, primed once
//!
//! send(request)
//!     → provide_credentials (may refresh)
//!     → buffer body, hash the buffered bytes
//!     → sign with the same bytes in place
//!     → inner.forward
//! ```
//!
//! Any failure before `inner.forward` returns without touching the network.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use bytes::Bytes;
use chrono::Utc;

use crate::auth::credentials::{
    region_from_env, CachedCredentials, CredentialsChain, EnvironmentCredentials,
    ProvideCredentials, SharedCredentials,
};
use crate::auth::forward::{buffer_request, SharedForward};
use crate::auth::metadata::{ContainerCredentials, InstanceMetadataCredentials};
use crate::auth::profile::{Profile, ProfileCredentials};
use crate::auth::sigv4::{self, SigningParams};
use crate::auth::sts::AssumeRoleProvider;
use crate::auth::types::{TransportError, TransportResult};
use crate::config::IamConfig;

/// Ambient credential and region configuration.
#[derive(Debug, Clone)]
pub struct AwsContext {
    pub region: Option<String>,
    pub credentials: SharedCredentials,
}

impl AwsContext {
    pub fn new(region: impl Into<String>, credentials: SharedCredentials) -> Self {
        Self {
            region: Some(region.into()),
            credentials,
        }
    }

    /// The default ambient configuration.
    ///
    /// Region: `AWS_REGION`, `AWS_DEFAULT_REGION`, then the active profile.
    /// Credentials: environment, profile files, container endpoint, then
    /// instance metadata. Profile files are read here; credentials are
    /// fetched on first use and cached until near expiry.
    pub fn load_default(forward: SharedForward) -> Self {
        let profile = Profile::load();
        let region = region_from_env().or_else(|| profile.region.clone());

        let chain = CredentialsChain::new()
            .or_else("environment", Arc::new(EnvironmentCredentials))
            .or_else("profile", Arc::new(ProfileCredentials::from(&profile)))
            .or_else("container", Arc::new(ContainerCredentials::from_env(forward.clone())))
            .or_else(
                "instance-metadata",
                Arc::new(InstanceMetadataCredentials::from_env(forward)),
            );

        Self {
            region,
            credentials: Arc::new(CachedCredentials::new(Arc::new(chain))),
        }
    }
}

#[derive(Debug)]
pub struct IamTransport {
    url: String,
    region: String,
    service: String,
    credentials: SharedCredentials,
    inner: SharedForward,
}

impl IamTransport {
    /// Resolve credentials and, when a role is configured, perform the one
    /// role-assumption exchange before returning.
    pub async fn connect(
        config: &IamConfig,
        ambient: Option<AwsContext>,
        inner: SharedForward,
    ) -> TransportResult<Self> {
        if config.url.is_empty() {
            return Err(TransportError::Config("missing URL config".into()));
        }

        let ambient = ambient.unwrap_or_else(|| AwsContext::load_default(inner.clone()));
        let region = config
            .region
            .clone()
            .or(ambient.region)
            .ok_or_else(|| TransportError::Config("missing region config".into()))?;

        let credentials: SharedCredentials = match config.role.as_deref() {
            Some(role) if !role.is_empty() => {
                let mut provider =
                    AssumeRoleProvider::new(ambient.credentials, inner.clone(), role, &region)
                        .with_external_id(config.external_id.clone());
                if let Some(endpoint) = &config.sts_endpoint {
                    provider = provider.with_endpoint(endpoint);
                }

                let cache: SharedCredentials =
                    Arc::new(CachedCredentials::new(Arc::new(provider)));
                cache.provide_credentials().await?;
                tracing::info!(role = %role, region = %region, "Assumed role for signed transport");
                cache
            }
            _ => ambient.credentials,
        };

        Ok(Self {
            url: config.url.clone(),
            region,
            service: config.service.clone(),
            credentials,
            inner,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub async fn send(&self, request: Request<Body>) -> TransportResult<Response<Bytes>> {
        let credentials = self.credentials.provide_credentials().await?;

        let mut request = buffer_request(request).await?;
        let hash = sigv4::payload_hash(request.body());

        let params = SigningParams {
            credentials: &credentials,
            region: &self.region,
            service: &self.service,
            time: Utc::now(),
        };
        sigv4::sign(&mut request, &hash, &params)?;

        self.inner.forward(request).await
    }
}
