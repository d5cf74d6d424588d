//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! gateway, auth, http subsystems produce:
//!     → logging.rs (structured tracing events, request-id spans)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Prometheus scrape endpoint (emulator only)
//! ```

pub mod logging;
pub mod metrics;
