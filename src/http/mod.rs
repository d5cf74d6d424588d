//! Local edge emulator.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → server.rs (collapse into a ProxyEvent)
//!     → Gateway Controller
//!     → upstream.rs (relay to the JSON-RPC server, optionally authenticated)
//!     → ProxyResponse
//!     → server.rs (back onto HTTP)
//! ```
//!
//! Lets the gateway run on a workstation without the serverless front door.

pub mod server;
pub mod upstream;

pub use server::{from_proxy_response, to_event, GatewayServer, LOCAL_STAGE};
pub use upstream::{Delivery, UpstreamHandler};
