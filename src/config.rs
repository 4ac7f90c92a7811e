//! Relay configuration
//!
//! Settings come from `RELAY_*` environment variables, falling back to an
//! optional `config.yaml` for the keys older deployments kept there.

use crate::runtime::DEFAULT_QUEUE_CAPACITY;
use crate::state::{ConversationId, StateDefaults};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const DEFAULT_MAX_TOKENS: u32 = 16000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_DATA_DIR: &str = "./data/store";
pub const DEFAULT_CACHE_SWEEP_SECS: u64 = 600;

/// Name of the optional settings file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Directories searched for the settings file, first match wins
pub const CONFIG_SEARCH_DIRS: [&str; 3] = [".", "config", "data/config"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("failed to load {}: {message}", path.display())]
    File { path: PathBuf, message: String },
}

impl ConfigError {
    fn file(path: &Path, err: &impl std::fmt::Display) -> Self {
        Self::File {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Settings read from `config.yaml`. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileConfig {
    pub api_token: Option<String>,
    pub api_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub default_model: Option<String>,
}

impl FileConfig {
    /// Load the first settings file found under `root`, or nothing
    pub fn discover(root: &Path) -> Result<Self, ConfigError> {
        for dir in CONFIG_SEARCH_DIRS {
            let path = root.join(dir).join(CONFIG_FILE_NAME);
            if path.is_file() {
                return Self::load(&path);
            }
        }
        tracing::debug!("No config file found, using environment only");
        Ok(Self::default())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::file(path, &e))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = serde_yaml::from_str(&raw).map_err(|e| ConfigError::file(path, &e))?;
        tracing::info!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// File value standing in for an environment key
    fn value_for(&self, key: &str) -> Option<String> {
        let value = match key {
            "RELAY_BOT_TOKEN" => &self.api_token,
            "RELAY_API_ENDPOINT" => &self.api_endpoint,
            "RELAY_API_KEY" => &self.api_key,
            "RELAY_DEFAULT_MODEL" => &self.default_model,
            _ => return None,
        };
        value.clone()
    }
}

/// Conversations allowed to use the relay. Empty means everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList(HashSet<ConversationId>);

impl AllowList {
    pub fn permits(&self, id: ConversationId) -> bool {
        self.0.is_empty() || self.0.contains(&id)
    }

    pub fn is_open(&self) -> bool {
        self.0.is_empty()
    }

    fn parse(raw: &str) -> Self {
        let mut ids = HashSet::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.parse::<i64>() {
                Ok(id) => {
                    ids.insert(ConversationId(id));
                }
                Err(_) => tracing::warn!(value = %part, "Ignoring invalid RELAY_ALLOWED_CHATS entry"),
            }
        }
        Self(ids)
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bot_token: String,
    pub api_endpoint: String,
    pub api_key: String,
    pub default_model: String,
    pub system_prompt: String,
    pub allowed_chats: AllowList,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub data_dir: PathBuf,
    pub queue_capacity: usize,
    pub cache_sweep_interval: Duration,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = FileConfig::discover(Path::new("."))?;
        Self::from_lookup(&file, |key| std::env::var(key).ok())
    }

    /// Build from any key lookup, falling back to `file`. Blank values count
    /// as unset.
    pub fn from_lookup(
        file: &FileConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let set = |v: &String| !v.trim().is_empty();
        let get = |key: &str| {
            lookup(key)
                .filter(set)
                .or_else(|| file.value_for(key).filter(set))
        };
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        Ok(Self {
            bot_token: required("RELAY_BOT_TOKEN")?,
            api_endpoint: required("RELAY_API_ENDPOINT")?,
            api_key: get("RELAY_API_KEY").unwrap_or_default(),
            default_model: get("RELAY_DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            system_prompt: get("RELAY_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            allowed_chats: get("RELAY_ALLOWED_CHATS")
                .map(|raw| AllowList::parse(&raw))
                .unwrap_or_default(),
            max_tokens: parse_or("RELAY_MAX_TOKENS", get("RELAY_MAX_TOKENS"), DEFAULT_MAX_TOKENS),
            request_timeout: Duration::from_secs(parse_or(
                "RELAY_REQUEST_TIMEOUT_SECS",
                get("RELAY_REQUEST_TIMEOUT_SECS"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            data_dir: get("RELAY_DATA_DIR").map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
            queue_capacity: parse_or(
                "RELAY_QUEUE_CAPACITY",
                get("RELAY_QUEUE_CAPACITY"),
                DEFAULT_QUEUE_CAPACITY,
            ),
            cache_sweep_interval: Duration::from_secs(parse_or(
                "RELAY_CACHE_SWEEP_SECS",
                get("RELAY_CACHE_SWEEP_SECS"),
                DEFAULT_CACHE_SWEEP_SECS,
            )),
        })
    }

    pub fn state_defaults(&self) -> StateDefaults {
        StateDefaults {
            model: self.default_model.clone(),
            system_prompt: self.system_prompt.clone(),
        }
    }
}

/// Parse a positive number, falling back to `default` with a warning
fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy + std::fmt::Display,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        _ => {
            tracing::warn!(key, value = %raw, default = %default, "Invalid setting, using default");
            default
        }
    }
}
