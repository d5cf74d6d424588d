//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway
//! emulator and the outbound transports. All types derive Serde traits for
//! deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration for the local emulator.
    pub listener: ListenerConfig,

    /// HTTP JSON-RPC server the emulator delegates to.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Authenticated transport used for upstream calls. Unauthenticated when absent.
    pub transport: Option<TransportConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:3000").
    pub bind_address: String,

    /// Whole-request deadline in seconds.
    pub request_timeout_secs: u64,

    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            request_timeout_secs: 30,
            // Edge proxies cap payloads at 10 MB.
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Upstream JSON-RPC server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Full URL requests are forwarded to; the event path is appended.
    pub url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Outbound authentication scheme, selected once at construction.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Fixed basic-auth header from a shared secret.
    ApiKey(ApiKeyConfig),

    /// Per-request signature with ambient or role-assumed credentials.
    Iam(IamConfig),
}

impl TransportConfig {
    pub fn url(&self) -> &str {
        match self {
            TransportConfig::ApiKey(c) => &c.url,
            TransportConfig::Iam(c) => &c.url,
        }
    }
}

/// Shared-secret transport settings.
#[derive(Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ApiKeyConfig {
    pub url: String,
    pub access: String,
    pub secret: String,
}

impl std::fmt::Debug for ApiKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyConfig")
            .field("url", &self.url)
            .field("access", &self.access)
            .field("secret", &"** redacted **")
            .finish()
    }
}

/// Signed-request transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IamConfig {
    pub url: String,

    /// Role to assume before signing. Ambient credentials are used directly when unset.
    pub role: Option<String>,

    /// Only meaningful together with `role`.
    pub external_id: Option<String>,

    /// Signing region. Falls back to the environment when unset.
    pub region: Option<String>,

    /// Service name in the credential scope.
    pub service: String,

    /// Override for the STS endpoint (regional endpoint by default).
    pub sts_endpoint: Option<String>,
}

impl Default for IamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            role: None,
            external_id: None,
            region: None,
            service: "execute-api".to_string(),
            sts_endpoint: None,
        }
    }
}
