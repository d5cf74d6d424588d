//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check transport settings that only make sense together
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, TransportConfig};

/// A single semantic problem, tagged with the offending key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {:?}", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be greater than zero",
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "listener.max_body_bytes",
            "must be greater than zero",
        ));
    }

    check_url(&mut errors, "upstream.url", &config.upstream.url);

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {:?}", config.observability.metrics_address),
        ));
    }

    match &config.transport {
        Some(TransportConfig::ApiKey(api_key)) => {
            check_url(&mut errors, "transport.url", &api_key.url);
            if api_key.access.is_empty() {
                errors.push(ValidationError::new("transport.access", "must not be empty"));
            }
            if api_key.secret.is_empty() {
                errors.push(ValidationError::new("transport.secret", "must not be empty"));
            }
        }
        Some(TransportConfig::Iam(iam)) => {
            check_url(&mut errors, "transport.url", &iam.url);
            if iam.service.is_empty() {
                errors.push(ValidationError::new("transport.service", "must not be empty"));
            }
            if iam.external_id.is_some() && iam.role.is_none() {
                errors.push(ValidationError::new(
                    "transport.external_id",
                    "only meaningful together with transport.role",
                ));
            }
            if let Some(endpoint) = &iam.sts_endpoint {
                check_url(&mut errors, "transport.sts_endpoint", endpoint);
            }
        }
        None => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.is_empty() {
        errors.push(ValidationError::new(field, "missing URL"));
    } else if let Err(e) = Url::parse(value) {
        errors.push(ValidationError::new(field, format!("invalid URL: {}", e)));
    }
}
