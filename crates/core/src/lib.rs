pub mod config;
pub mod state;
pub mod path_utils;

use tracing::info;

pub use config::{AppConfig, BackendKind, ConfigError};
pub use state::AppState;

pub fn init() {
    info!("🔭 LensBot Core Initialized");
}
