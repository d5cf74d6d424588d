//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → listener/upstream settings to the emulator
//!     → TransportConfig to AuthTransport::from_config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - The transport scheme is a tagged table, so exactly one scheme is configured

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ApiKeyConfig, GatewayConfig, IamConfig, ListenerConfig, ObservabilityConfig, TransportConfig,
    UpstreamConfig,
};
pub use validation::ValidationError;
