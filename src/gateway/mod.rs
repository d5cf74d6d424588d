//! Edge-proxy to HTTP handler bridge.
//!
//! # Data Flow
//! ```text
//! ProxyEvent (edge wire JSON)
//!     → controller.rs (GET rejection, envelope inspection)
//!     → request.rs (canonical http::Request, lazy base64 body)
//!     → ProtocolHandler (external JSON-RPC server)
//!     → recorder.rs (buffer status, headers, body)
//!     → ProxyResponse (emitted exactly once)
//! ```
//!
//! # Design Decisions
//! - One buffered request and one buffered response per call; streaming is
//!   rejected up front
//! - The controller holds no per-call state, so a single instance is shared
//!   by every concurrent invocation

pub mod controller;
pub mod recorder;
pub mod request;
pub mod types;

pub use controller::{Gateway, ProtocolHandler, STREAMING_REJECTED_STATUS};
pub use recorder::ResponseRecorder;
pub use request::{into_request, ProxyRequest, RequestBody};
pub use types::{GatewayError, GatewayResult, ProxyEvent, ProxyResponse, RequestContext};
