//! Forwarding capability wrapped by the authenticated transports.
//!
//! Transports never reach for a global client: the forwarder is always an
//! explicit dependency, with `HttpForwarder` as the provided default.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use bytes::Bytes;

use crate::auth::types::{TransportError, TransportResult};

/// Sends a fully-buffered request and returns the fully-buffered response.
#[async_trait]
pub trait Forward: Send + Sync + fmt::Debug {
    async fn forward(&self, request: Request<Bytes>) -> TransportResult<Response<Bytes>>;
}

pub type SharedForward = Arc<dyn Forward>;

/// Default forwarder backed by a pooled `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-configured client (timeouts, proxies, TLS roots).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn shared() -> SharedForward {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl Forward for HttpForwarder {
    async fn forward(&self, request: Request<Bytes>) -> TransportResult<Response<Bytes>> {
        let request = reqwest::Request::try_from(request)?;
        let response = self.client.execute(request).await?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        let mut out = Response::new(body);
        *out.status_mut() = status;
        *out.version_mut() = version;
        *out.headers_mut() = headers;
        Ok(out)
    }
}

/// Read a streaming request body fully into memory.
///
/// Both transports need the exact bytes before forwarding: the signed
/// variant hashes them, and the forwarder sends them unchanged.
pub async fn buffer_request(request: Request<Body>) -> TransportResult<Request<Bytes>> {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;
    Ok(Request::from_parts(parts, bytes))
}
