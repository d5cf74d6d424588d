//! Wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Edge event body (bytes)
//!     → envelope.rs (JSON-RPC 2.0 decode)
//!     → Envelope (logged, counted)
//!     → gateway controller continues with the original bytes
//! ```
//!
//! # Design Decisions
//! - Decoding is observational; the envelope never alters routing
//! - Only single messages are understood, matching the one-request,
//!   one-response shape of the edge transport

pub mod envelope;

pub use envelope::{DecodeError, Envelope, JsonRpcError, JsonRpcId};
