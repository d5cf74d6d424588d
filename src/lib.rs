//! Serverless JSON-RPC gateway.
//!
//! Bridges single-shot edge-proxy events to an HTTP-style protocol handler,
//! and provides the authenticated transports clients use to reach the
//! deployed gateway.

pub mod auth;
pub mod client;
pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod protocol;

pub use auth::{AuthTransport, TransportError};
pub use client::{ClientError, RpcClient};
pub use config::GatewayConfig;
pub use gateway::{Gateway, GatewayError, ProtocolHandler, ProxyEvent, ProxyResponse};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
