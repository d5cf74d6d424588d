//! Gateway controller: edge event in, edge response out.
//!
//! # Responsibilities
//! - Reject GET (streaming session setup) with 405
//! - Pass empty-body control-plane calls straight to the handler
//! - Decode non-empty bodies as JSON-RPC envelopes for observability
//! - Dispatch exactly once to the protocol handler and finalize the recorder
//!
//! # Design Decisions
//! - Stateless across calls; one `Gateway` serves any number of concurrent events
//! - No timeout of its own. The caller's deadline applies by dropping the future
//! - A malformed body aborts the call with an error. No JSON-RPC error
//!   response is synthesized here.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use tracing::Instrument;
use uuid::Uuid;

use crate::gateway::recorder::ResponseRecorder;
use crate::gateway::request::{into_request, ProxyRequest};
use crate::gateway::types::{GatewayResult, ProxyEvent, ProxyResponse};
use crate::observability::metrics;
use crate::protocol::{DecodeError, Envelope};

/// Status returned for any GET: the edge transport cannot hold a stream open.
pub const STREAMING_REJECTED_STATUS: u16 = 405;

/// The protocol server the gateway delegates to.
///
/// Implementations write their reply into the responder. Everything they
/// write is buffered and released as one `ProxyResponse`.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    async fn serve(&self, responder: &mut ResponseRecorder, request: ProxyRequest);
}

#[async_trait]
impl<H: ProtocolHandler + ?Sized> ProtocolHandler for Arc<H> {
    async fn serve(&self, responder: &mut ResponseRecorder, request: ProxyRequest) {
        (**self).serve(responder, request).await
    }
}

/// Serverless JSON-RPC gateway.
pub struct Gateway<H> {
    handler: H,
}

impl<H: ProtocolHandler> Gateway<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Handle one edge event.
    pub async fn serve(&self, event: ProxyEvent) -> GatewayResult<ProxyResponse> {
        let request_id = event
            .request_id()
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = tracing::info_span!(
            "gateway",
            request_id = %request_id,
            method = %event.http_method,
            path = %event.path,
        );

        self.dispatch(event).instrument(span).await
    }

    async fn dispatch(&self, event: ProxyEvent) -> GatewayResult<ProxyResponse> {
        let start_time = Instant::now();
        let method = event.http_method.clone();

        if method == "GET" {
            tracing::debug!("Rejecting streaming session request");
            metrics::record_streaming_rejected();
            metrics::record_request(&method, STREAMING_REJECTED_STATUS, start_time);
            return Ok(ProxyResponse::status(STREAMING_REJECTED_STATUS));
        }

        if !event.body.is_empty() {
            let envelope = match inspect(&event) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::error!(error = %e, "bad json-rpc message");
                    metrics::record_decode_failure();
                    return Err(e.into());
                }
            };

            tracing::debug!(
                kind = envelope.kind(),
                rpc_method = envelope.method().unwrap_or("-"),
                rpc_id = %envelope.id().map(|id| id.to_string()).unwrap_or_default(),
                "received json-rpc message"
            );
        }

        let response = match self.serve_handler(event).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_construction_failure();
                return Err(e);
            }
        };
        metrics::record_request(&method, response.status_code, start_time);
        Ok(response)
    }

    async fn serve_handler(&self, event: ProxyEvent) -> GatewayResult<ProxyResponse> {
        let request = into_request(event).inspect_err(|e| {
            tracing::error!(error = %e, "bad http request");
        })?;

        let mut reply = ResponseRecorder::new();
        self.handler.serve(&mut reply, request).await;

        let response = reply.finish();
        tracing::debug!(status = response.status_code, "Handler completed");
        Ok(response)
    }
}

/// Decode the event body as an envelope without touching what the handler sees.
fn inspect(event: &ProxyEvent) -> Result<Envelope, DecodeError> {
    if event.is_base64_encoded {
        let bytes = general_purpose::STANDARD.decode(event.body.as_bytes())?;
        Envelope::decode(&bytes)
    } else {
        Envelope::decode(event.body.as_bytes())
    }
}
