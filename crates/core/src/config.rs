use config::{Config, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default number of results a reply asks for.
pub const DEFAULT_RESULT_CAP: usize = 9;

/// Hard ceiling imposed by the chat surface (Discord allows 10 embeds per message).
pub const PLATFORM_MAX_RESULTS: usize = 10;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config source error: {0}")]
    Source(#[from] config::ConfigError),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Scratch directory {path} unusable: {source}")]
    ScratchDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Which search provider the orchestrator talks to.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Vision,
    Redirect,
    Link,
    Generic,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vision" => Ok(Self::Vision),
            "redirect" | "lens" => Ok(Self::Redirect),
            "link" | "link_only" => Ok(Self::Link),
            "generic" | "api" => Ok(Self::Generic),
            other => Err(ConfigError::Invalid {
                key: "SEARCH_BACKEND",
                reason: format!("unknown backend '{}' (expected vision, redirect, link or generic)", other),
            }),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vision => "vision",
            Self::Redirect => "redirect",
            Self::Link => "link",
            Self::Generic => "generic",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(alias = "DISCORD_TOKEN")]
    pub discord_token: Option<String>,

    #[serde(alias = "TELEGRAM_BOT_TOKEN")]
    pub telegram_bot_token: Option<String>,

    #[serde(alias = "TELEGRAM_ALLOWED_USERS")]
    pub telegram_allowed_users: Option<String>,

    #[serde(alias = "SEARCH_BACKEND")]
    pub search_backend: String,

    #[serde(alias = "SEARCH_API_KEY")]
    pub search_api_key: Option<String>,

    #[serde(alias = "SEARCH_API_ENDPOINT")]
    pub search_api_endpoint: Option<String>,

    #[serde(alias = "RESULT_CAP")]
    pub result_cap: usize,

    #[serde(alias = "SCRATCH_DIR")]
    pub scratch_dir: Option<String>,

    #[serde(alias = "HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: u64,

    #[serde(alias = "MAX_IMAGE_BYTES")]
    pub max_image_bytes: u64,

    #[serde(alias = "REACT_TO_UPLOADS")]
    pub react_to_uploads: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        // 1. Try standard dotenv discovery from current dir
        if dotenvy::dotenv().is_err() {
            // 2. Fallback: the .env next to the resolved LENSBOT_ROOT
            let path = crate::path_utils::get_app_root().join(".env");
            if path.exists() {
                let _ = dotenvy::from_path(&path);
            }
        }

        let builder = Self::defaults()?
            .add_source(File::with_name("lensbot").required(false))
            .add_source(Environment::default());

        Self::from_config(builder.build()?)
    }

    /// Builder pre-seeded with every default, so partial sources deserialize.
    pub fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("search_backend", "link")?
            .set_default("result_cap", DEFAULT_RESULT_CAP as i64)?
            .set_default("http_timeout_secs", DEFAULT_HTTP_TIMEOUT_SECS as i64)?
            .set_default("max_image_bytes", DEFAULT_MAX_IMAGE_BYTES as i64)?
            .set_default("react_to_uploads", true)?)
    }

    pub fn from_config(source: Config) -> Result<Self, ConfigError> {
        let config: Self = source.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.result_cap == 0 || self.result_cap > PLATFORM_MAX_RESULTS {
            return Err(ConfigError::Invalid {
                key: "RESULT_CAP",
                reason: format!("{} is outside 1..={}", self.result_cap, PLATFORM_MAX_RESULTS),
            });
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "HTTP_TIMEOUT_SECS",
                reason: "timeout must be at least one second".to_string(),
            });
        }
        if self.backend()? == BackendKind::Generic && self.endpoint().is_none() {
            return Err(ConfigError::Missing("SEARCH_API_ENDPOINT"));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }

    pub fn backend(&self) -> Result<BackendKind, ConfigError> {
        self.search_backend.parse()
    }

    /// Provider credential, treating an empty value as unset.
    pub fn credential(&self) -> Option<&str> {
        non_empty(self.search_api_key.as_deref())
    }

    pub fn endpoint(&self) -> Option<&str> {
        non_empty(self.search_api_endpoint.as_deref())
    }

    pub fn discord_token(&self) -> Result<&str, ConfigError> {
        non_empty(self.discord_token.as_deref()).ok_or(ConfigError::Missing("DISCORD_TOKEN"))
    }

    pub fn telegram_token(&self) -> Result<&str, ConfigError> {
        non_empty(self.telegram_bot_token.as_deref()).ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))
    }

    pub fn allowed_users(&self) -> Vec<String> {
        self.telegram_allowed_users
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Printable view of the configuration with secrets masked.
    pub fn summary(&self) -> serde_json::Value {
        let mask = |v: Option<&str>| if non_empty(v).is_some() { "set" } else { "unset" };
        serde_json::json!({
            "discord_token": mask(self.discord_token.as_deref()),
            "telegram_bot_token": mask(self.telegram_bot_token.as_deref()),
            "telegram_allowed_users": self.allowed_users(),
            "search_backend": self.search_backend,
            "search_api_key": mask(self.search_api_key.as_deref()),
            "search_api_endpoint": self.endpoint(),
            "result_cap": self.result_cap,
            "scratch_dir": crate::path_utils::scratch_root(self.scratch_dir.as_deref()),
            "http_timeout_secs": self.http_timeout_secs,
            "max_image_bytes": self.max_image_bytes,
            "react_to_uploads": self.react_to_uploads,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
