//! Shared credentials and config files.
//!
//! The active profile is `AWS_PROFILE`, or `default`. Files live at
//! `~/.aws/credentials` and `~/.aws/config` unless
//! `AWS_SHARED_CREDENTIALS_FILE` / `AWS_CONFIG_FILE` point elsewhere.
//! Both are read once, when the profile is loaded.
//!
//! Only static keys and `region` are understood. Keys in the credentials
//! file take precedence over the same keys in the config file.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::auth::credentials::{non_empty_env, ProvideCredentials};
use crate::auth::types::{CredentialError, Credentials};

pub const ENV_PROFILE: &str = "AWS_PROFILE";
pub const ENV_CREDENTIALS_FILE: &str = "AWS_SHARED_CREDENTIALS_FILE";
pub const ENV_CONFIG_FILE: &str = "AWS_CONFIG_FILE";
pub const DEFAULT_PROFILE: &str = "default";

type Section = HashMap<String, String>;

/// Split an INI-style file into sections of lowercase keys.
pub fn parse_sections(text: &str) -> HashMap<String, Section> {
    let mut sections: HashMap<String, Section> = HashMap::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        let Some(section) = current.as_ref() else { continue };
        if let Some((key, value)) = line.split_once('=') {
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    sections
}

/// One resolved profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub credentials: Option<Credentials>,
    pub region: Option<String>,
}

impl Profile {
    /// Resolve the active profile from the environment and the shared files.
    pub fn load() -> Self {
        let name = non_empty_env(ENV_PROFILE).unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        let credentials = shared_file(ENV_CREDENTIALS_FILE, "credentials");
        let config = shared_file(ENV_CONFIG_FILE, "config");
        Self::load_from(&name, credentials.as_deref(), config.as_deref())
    }

    /// Resolve `name` from explicit file paths. Missing files count as empty.
    pub fn load_from(name: &str, credentials_file: Option<&Path>, config_file: Option<&Path>) -> Self {
        let credentials = credentials_file.and_then(read_optional);
        let config = config_file.and_then(read_optional);
        Self::from_files(name, credentials.as_deref(), config.as_deref())
    }

    /// Resolve `name` from file contents.
    pub fn from_files(name: &str, credentials_file: Option<&str>, config_file: Option<&str>) -> Self {
        // Config file sections are `[profile name]`, except `[default]`.
        let mut merged = config_file
            .map(parse_sections)
            .and_then(|mut sections| {
                sections.remove(&format!("profile {}", name)).or_else(|| {
                    (name == DEFAULT_PROFILE)
                        .then(|| sections.remove(DEFAULT_PROFILE))
                        .flatten()
                })
            })
            .unwrap_or_default();

        if let Some(section) = credentials_file.map(parse_sections).and_then(|mut s| s.remove(name)) {
            merged.extend(section);
        }

        let value = |key: &str| merged.get(key).filter(|v| !v.is_empty()).cloned();

        let credentials = match (value("aws_access_key_id"), value("aws_secret_access_key")) {
            (Some(access), Some(secret)) => {
                let creds = Credentials::new(access, secret);
                Some(match value("aws_session_token") {
                    Some(token) => creds.with_session_token(token),
                    None => creds,
                })
            }
            _ => None,
        };

        Self {
            name: name.to_string(),
            credentials,
            region: value("region"),
        }
    }
}

fn shared_file(env_key: &str, file: &str) -> Option<PathBuf> {
    match non_empty_env(env_key) {
        Some(path) => Some(PathBuf::from(path)),
        None => dirs::home_dir().map(|home| home.join(".aws").join(file)),
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read shared AWS file");
            None
        }
    }
}

/// Static keys from the active profile.
#[derive(Debug, Clone)]
pub struct ProfileCredentials {
    profile: String,
    credentials: Option<Credentials>,
}

impl From<&Profile> for ProfileCredentials {
    fn from(profile: &Profile) -> Self {
        Self {
            profile: profile.name.clone(),
            credentials: profile.credentials.clone(),
        }
    }
}

#[async_trait]
impl ProvideCredentials for ProfileCredentials {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError> {
        self.credentials.clone().ok_or_else(|| {
            CredentialError::NotLoaded(format!("profile {:?} has no static keys", self.profile))
        })
    }
}
