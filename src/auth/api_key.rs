//! Shared-secret transport.
//!
//! The digest is computed once at construction; every call carries the
//! same `Authorization: Basic` header.

use axum::body::Body;
use axum::http::{header::AUTHORIZATION, HeaderValue, Request, Response};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use bytes::Bytes;

use crate::auth::forward::{buffer_request, SharedForward};
use crate::auth::types::{TransportError, TransportResult};
use crate::config::ApiKeyConfig;

/// Unpadded base64 of `access:secret`.
pub fn basic_digest(access: &str, secret: &str) -> String {
    STANDARD_NO_PAD.encode(format!("{}:{}", access, secret))
}

#[derive(Debug)]
pub struct ApiKeyTransport {
    url: String,
    authorization: HeaderValue,
    inner: SharedForward,
}

impl ApiKeyTransport {
    pub fn new(config: &ApiKeyConfig, inner: SharedForward) -> TransportResult<Self> {
        if config.url.is_empty() {
            return Err(TransportError::Config("missing URL config".into()));
        }

        let digest = basic_digest(&config.access, &config.secret);
        let mut authorization = HeaderValue::from_str(&format!("Basic {}", digest))
            .map_err(|e| TransportError::Config(e.to_string()))?;
        authorization.set_sensitive(true);

        Ok(Self {
            url: config.url.clone(),
            authorization,
            inner,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The precomputed header value sent on every call.
    pub fn authorization(&self) -> &HeaderValue {
        &self.authorization
    }

    pub async fn send(&self, request: Request<Body>) -> TransportResult<Response<Bytes>> {
        let mut request = buffer_request(request).await?;
        // Replaces any caller value: exactly one credential goes upstream.
        request
            .headers_mut()
            .insert(AUTHORIZATION, self.authorization.clone());
        self.inner.forward(request).await
    }
}
