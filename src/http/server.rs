//! Local edge emulator.
//!
//! # Responsibilities
//! - Create the Axum Router with a single catch-all handler
//! - Wire up middleware (tracing, timeout, body limit)
//! - Convert each HTTP request into an edge event, the way the serverless
//!   front door would
//! - Run the event through the Gateway Controller
//! - Map the edge response back onto HTTP; gateway errors become 502

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};
use url::form_urlencoded;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::gateway::{Gateway, ProtocolHandler, ProxyEvent, ProxyResponse, RequestContext};

/// Stage name reported in emulated request contexts.
pub const LOCAL_STAGE: &str = "local";

type SharedGateway = Arc<Gateway<Arc<dyn ProtocolHandler>>>;

/// HTTP server fronting a gateway.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, handler: Arc<dyn ProtocolHandler>) -> Self {
        let gateway = Arc::new(Gateway::new(handler));
        Self {
            router: Self::build_router(&config, gateway),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, gateway: SharedGateway) -> Router {
        Router::new()
            .route("/{*path}", any(edge_handler))
            .route("/", any(edge_handler))
            .with_state(gateway)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.listener.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    /// The configured router, for serving on a caller-owned listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `stop` fires. Obtain it from `Shutdown::subscribe` before
    /// spawning so an early trigger is not missed.
    pub async fn run(
        self,
        listener: TcpListener,
        mut stop: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway emulator starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Draining in-flight requests");
            })
            .await?;

        tracing::info!("Gateway emulator stopped");
        Ok(())
    }
}

async fn edge_handler(State(gateway): State<SharedGateway>, request: Request<Body>) -> Response {
    let event = match to_event(request).await {
        Ok(event) => event,
        Err(response) => return response,
    };

    match gateway.serve(event).await {
        Ok(reply) => from_proxy_response(reply),
        Err(e) => {
            tracing::warn!(error = %e, "Gateway call failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Collapse an HTTP request into a single-valued edge event.
pub async fn to_event(request: Request<Body>) -> Result<ProxyEvent, Response> {
    let (parts, body) = request.into_parts();

    let bytes = to_bytes(body, usize::MAX).await.map_err(|e| {
        tracing::warn!(error = %e, "Request body rejected");
        (StatusCode::PAYLOAD_TOO_LARGE, "request body rejected").into_response()
    })?;

    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in parts.headers.iter() {
        let Ok(value) = value.to_str() else { continue };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    let query_string_parameters: HashMap<String, String> = parts
        .uri
        .query()
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let (body, is_base64_encoded) = match String::from_utf8(bytes.to_vec()) {
        Ok(text) => (text, false),
        Err(_) => (general_purpose::STANDARD.encode(&bytes), true),
    };

    Ok(ProxyEvent {
        http_method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        headers,
        query_string_parameters,
        body,
        is_base64_encoded,
        request_context: Some(RequestContext {
            request_id: Some(Uuid::new_v4().to_string()),
            stage: Some(LOCAL_STAGE.to_string()),
        }),
    })
}

/// Turn an edge response back into HTTP.
pub fn from_proxy_response(reply: ProxyResponse) -> Response {
    let Ok(status) = StatusCode::from_u16(reply.status_code) else {
        tracing::error!(status = reply.status_code, "Handler produced an invalid status");
        return StatusCode::BAD_GATEWAY.into_response();
    };

    let body = if reply.is_base64_encoded {
        match general_purpose::STANDARD.decode(reply.body.as_bytes()) {
            Ok(bytes) => Body::from(bytes),
            Err(e) => {
                tracing::error!(error = %e, "Handler produced an undecodable body");
                return StatusCode::BAD_GATEWAY.into_response();
            }
        }
    } else {
        Body::from(reply.body)
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    for (name, values) in reply.multi_value_headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else { continue };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(&value) {
                response.headers_mut().append(name.clone(), value);
            }
        }
    }
    response
}
