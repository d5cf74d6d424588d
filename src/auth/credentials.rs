//! Credential providers.
//!
//! # Responsibilities
//! - Static credentials from configuration
//! - Ambient credentials and region from the process environment
//! - Ordered chains of sources, first loaded source wins
//! - Caching with refresh ahead of expiry
//!
//! # Design Decisions
//! - Providers are shared as `Arc<dyn ProvideCredentials>` across every
//!   in-flight call of a transport
//! - Reads are lock-free; a refresh takes a single-flight lock so concurrent
//!   callers wait for one exchange instead of starting their own

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::auth::types::{CredentialError, Credentials};

pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";

/// Refresh this long before credentials expire.
pub const REFRESH_BUFFER_SECS: i64 = 60;

/// Source of signing credentials. Retrieval may perform network I/O.
#[async_trait]
pub trait ProvideCredentials: Send + Sync + fmt::Debug {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError>;
}

pub type SharedCredentials = Arc<dyn ProvideCredentials>;

#[async_trait]
impl ProvideCredentials for Credentials {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError> {
        Ok(self.clone())
    }
}

/// Credentials from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` /
/// `AWS_SESSION_TOKEN`, read on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentCredentials;

impl EnvironmentCredentials {
    pub fn load() -> Result<Credentials, CredentialError> {
        let access = non_empty_env(ENV_ACCESS_KEY_ID)
            .ok_or_else(|| CredentialError::NotLoaded(format!("{} is not set", ENV_ACCESS_KEY_ID)))?;
        let secret = non_empty_env(ENV_SECRET_ACCESS_KEY).ok_or_else(|| {
            CredentialError::NotLoaded(format!("{} is not set", ENV_SECRET_ACCESS_KEY))
        })?;

        let mut creds = Credentials::new(access, secret);
        if let Some(token) = non_empty_env(ENV_SESSION_TOKEN) {
            creds = creds.with_session_token(token);
        }
        Ok(creds)
    }
}

#[async_trait]
impl ProvideCredentials for EnvironmentCredentials {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError> {
        Self::load()
    }
}

/// Region from `AWS_REGION`, falling back to `AWS_DEFAULT_REGION`.
pub fn region_from_env() -> Option<String> {
    non_empty_env(ENV_REGION).or_else(|| non_empty_env(ENV_DEFAULT_REGION))
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Tries each source in order. A source reporting `NotLoaded` passes to the
/// next one; any other error ends the lookup.
#[derive(Debug, Default)]
pub struct CredentialsChain {
    sources: Vec<(&'static str, SharedCredentials)>,
}

impl CredentialsChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn or_else(mut self, name: &'static str, source: SharedCredentials) -> Self {
        self.sources.push((name, source));
        self
    }
}

#[async_trait]
impl ProvideCredentials for CredentialsChain {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError> {
        let mut skipped = Vec::with_capacity(self.sources.len());

        for (name, source) in &self.sources {
            match source.provide_credentials().await {
                Ok(creds) => {
                    tracing::debug!(source = %name, "Credentials resolved");
                    return Ok(creds);
                }
                Err(CredentialError::NotLoaded(reason)) => {
                    tracing::trace!(source = %name, reason = %reason, "Credential source skipped");
                    skipped.push(format!("{}: {}", name, reason));
                }
                Err(e) => return Err(e),
            }
        }

        Err(CredentialError::NotLoaded(if skipped.is_empty() {
            "no credential sources".to_string()
        } else {
            skipped.join("; ")
        }))
    }
}

/// Caches another provider's credentials until shortly before they expire.
pub struct CachedCredentials {
    provider: SharedCredentials,
    cached: ArcSwapOption<Credentials>,
    refresh: Mutex<()>,
    buffer: chrono::Duration,
}

impl CachedCredentials {
    pub fn new(provider: SharedCredentials) -> Self {
        Self {
            provider,
            cached: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
            buffer: chrono::Duration::seconds(REFRESH_BUFFER_SECS),
        }
    }

    fn fresh(&self) -> Option<Credentials> {
        self.cached
            .load_full()
            .filter(|creds| !creds.expires_within(Utc::now(), self.buffer))
            .map(|creds| (*creds).clone())
    }
}

impl fmt::Debug for CachedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedCredentials")
            .field("provider", &self.provider)
            .field("cached", &self.cached.load().is_some())
            .finish()
    }
}

#[async_trait]
impl ProvideCredentials for CachedCredentials {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError> {
        if let Some(creds) = self.fresh() {
            return Ok(creds);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(creds) = self.fresh() {
            return Ok(creds);
        }

        let creds = self.provider.provide_credentials().await?;
        tracing::debug!(
            access_key_id = %creds.access_key_id,
            expiry = ?creds.expiry,
            "Credentials refreshed"
        );
        self.cached.store(Some(Arc::new(creds.clone())));
        Ok(creds)
    }
}
