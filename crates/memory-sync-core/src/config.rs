use crate::error::{Result, SyncError};
use crate::extract::DEFAULT_WORKERS;
use crate::utils::parse_positive_int;
use serde::Serialize;
use std::path::PathBuf;
use url::Url;

pub const ENV_URL: &str = "OPEN_WEBUI_URL";
pub const ENV_USER_ID: &str = "USER_ID";
pub const ENV_TOKEN: &str = "JWT_TOKEN";
pub const ENV_WORKERS: &str = "MEMORY_SYNC_WORKERS";
pub const ENV_TIMEOUT_MS: &str = "MEMORY_SYNC_TIMEOUT_MS";
pub const ENV_INPUT: &str = "MEMORY_SYNC_INPUT";
pub const ENV_OUTPUT: &str = "MEMORY_SYNC_OUTPUT";

#[derive(Debug, Clone, Serialize)]
pub struct SyncConfig {
    pub base_url: Option<String>,
    pub user_id: Option<String>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub workers: usize,
    pub timeout_ms: u64,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            user_id: None,
            token: None,
            workers: DEFAULT_WORKERS,
            timeout_ms: 30_000,
            input: PathBuf::from("conversations.json"),
            output: PathBuf::from("extracted_memories.jsonl"),
        }
    }
}

/// Connection settings for the remote memory store.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: Url,
    pub user_id: String,
    pub token: String,
    pub timeout_ms: u64,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source. Unset or invalid numeric
    /// values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            base_url: non_blank(lookup(ENV_URL)),
            user_id: non_blank(lookup(ENV_USER_ID)),
            token: non_blank(lookup(ENV_TOKEN)),
            workers: parse_positive_int(lookup(ENV_WORKERS).as_deref(), defaults.workers),
            timeout_ms: parse_positive_int(
                lookup(ENV_TIMEOUT_MS).as_deref(),
                defaults.timeout_ms as usize,
            ) as u64,
            input: non_blank(lookup(ENV_INPUT)).map_or(defaults.input, PathBuf::from),
            output: non_blank(lookup(ENV_OUTPUT)).map_or(defaults.output, PathBuf::from),
        }
    }

    /// Remote settings, or a config error naming what is missing.
    pub fn remote(&self) -> Result<RemoteConfig> {
        let missing = [
            (ENV_URL, self.base_url.is_none()),
            (ENV_USER_ID, self.user_id.is_none()),
            (ENV_TOKEN, self.token.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(SyncError::Config(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        let raw_url = self.base_url.clone().unwrap_or_default();
        let base_url = Url::parse(&raw_url)
            .map_err(|error| SyncError::Config(format!("{ENV_URL} {raw_url:?}: {error}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!(
                "{ENV_URL} must be http or https, got {}",
                base_url.scheme()
            )));
        }

        Ok(RemoteConfig {
            base_url,
            user_id: self.user_id.clone().unwrap_or_default(),
            token: self.token.clone().unwrap_or_default(),
            timeout_ms: self.timeout_ms,
        })
    }
}
