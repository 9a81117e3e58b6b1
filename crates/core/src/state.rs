use crate::config::{AppConfig, ConfigError};
use std::path::PathBuf;
use tracing::info;

/// Process-wide context, built once at startup and shared by every request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// Pooled client; every request goes through its timeout.
    pub http: reqwest::Client,
    pub scratch_dir: PathBuf,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        let scratch_dir = crate::path_utils::scratch_root(config.scratch_dir.as_deref());
        std::fs::create_dir_all(&scratch_dir).map_err(|source| ConfigError::ScratchDir {
            path: scratch_dir.clone(),
            source,
        })?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("lensbot/", env!("CARGO_PKG_VERSION")))
            .timeout(config.http_timeout())
            .build()?;

        info!("📂 Scratch directory: {}", scratch_dir.display());

        Ok(Self {
            config,
            http,
            scratch_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_scratch_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("nested").join("scratch");

        let mut config = AppConfig::from_config(AppConfig::defaults().unwrap().build().unwrap()).unwrap();
        config.scratch_dir = Some(target.to_string_lossy().to_string());

        let state = AppState::new(config).unwrap();
        assert_eq!(state.scratch_dir, target);
        assert!(target.is_dir());
    }
}
