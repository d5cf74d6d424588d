//! Protocol handler that relays the canonical request to an HTTP JSON-RPC server.
//!
//! # Responsibilities
//! - Resolve the target URL from the configured base and the event path
//! - Strip hop-by-hop and host headers before forwarding
//! - Route through the authenticated transport when one is configured
//! - Write the upstream reply (or a 502) into the responder

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{
    header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING},
    HeaderName, Request, Response, StatusCode,
};
use bytes::Bytes;

use crate::auth::{AuthTransport, SharedForward, TransportResult};
use crate::gateway::{ProtocolHandler, ProxyRequest, ResponseRecorder};

const HOP_BY_HOP: [HeaderName; 4] = [HOST, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING];

/// How requests leave the emulator.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Unauthenticated, straight to the forwarder.
    Plain(SharedForward),

    /// Through an authenticated transport.
    Authenticated(Arc<AuthTransport>),
}

#[derive(Debug, Clone)]
pub struct UpstreamHandler {
    base_url: String,
    delivery: Delivery,
}

impl UpstreamHandler {
    pub fn new(base_url: impl Into<String>, delivery: Delivery) -> Self {
        Self {
            base_url: base_url.into(),
            delivery,
        }
    }

    /// Forward to the transport's own endpoint.
    pub fn authenticated(transport: Arc<AuthTransport>) -> Self {
        Self::new(transport.url().to_string(), Delivery::Authenticated(transport))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn target(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path_and_query)
    }

    async fn deliver(&self, request: Request<Bytes>) -> TransportResult<Response<Bytes>> {
        match &self.delivery {
            Delivery::Plain(forward) => forward.forward(request).await,
            Delivery::Authenticated(transport) => transport.send(request.map(Body::from)).await,
        }
    }
}

#[async_trait]
impl ProtocolHandler for UpstreamHandler {
    async fn serve(&self, responder: &mut ResponseRecorder, request: ProxyRequest) {
        let (mut parts, mut body) = request.into_parts();

        let bytes = match body.read_to_vec() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable request body");
                responder.set_status(StatusCode::BAD_REQUEST);
                responder.append_body(b"unreadable request body");
                return;
            }
        };

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = self.target(path_and_query);

        for name in HOP_BY_HOP.iter() {
            parts.headers.remove(name);
        }

        let mut builder = Request::builder().method(parts.method).uri(target.as_str());
        if let Some(headers) = builder.headers_mut() {
            *headers = parts.headers;
        }
        let outbound = match builder.body(Bytes::from(bytes)) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(target = %target, error = %e, "Invalid upstream request");
                responder.set_status(StatusCode::BAD_GATEWAY);
                responder.append_body(b"invalid upstream request");
                return;
            }
        };

        match self.deliver(outbound).await {
            Ok(response) => {
                let (parts, body) = response.into_parts();
                responder.set_status(parts.status);
                for (name, value) in parts.headers.iter() {
                    if !HOP_BY_HOP.contains(name) {
                        responder.append_header(name.clone(), value.clone());
                    }
                }
                responder.append_body(&body);
                tracing::debug!(target = %target, status = parts.status.as_u16(), "Upstream replied");
            }
            Err(e) => {
                tracing::error!(target = %target, error = %e, "Upstream request failed");
                responder.set_status(StatusCode::BAD_GATEWAY);
                responder.append_body(b"upstream request failed");
            }
        }
    }
}
