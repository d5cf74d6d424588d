//! Credential types and transport error definitions.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Cloud credentials used to sign requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// `None` means the credentials never expire.
    pub expiry: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expiry: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// True when the credentials expire within `window` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        match self.expiry {
            Some(expiry) => expiry - window <= now,
            None => false,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Credentials could not be produced or refreshed.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credentials found in the ambient environment.
    #[error("credentials not loaded: {0}")]
    NotLoaded(String),

    /// The role-assumption exchange failed.
    #[error("assume role failed: {0}")]
    AssumeRole(String),

    /// A configured credential endpoint could not be reached or refused.
    #[error("credential endpoint failed: {0}")]
    Endpoint(String),

    /// The provider returned something we could not parse.
    #[error("invalid credential response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by the authenticated transports.
///
/// In every case the request has not been sent.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Missing or invalid transport configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Credential retrieval or refresh failed.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Signature computation failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// The request body could not be buffered.
    #[error("body error: {0}")]
    Io(String),

    /// The inner transport failed after the request was handed over.
    #[error("forward error: {0}")]
    Forward(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Forward(err.to_string())
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
