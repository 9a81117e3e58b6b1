//! Search backends
//!
//! One strategy per provider, all normalizing into `SearchResult`:
//! 1. vision - cloud vision web detection (labels, pages, similar images)
//! 2. redirect - image upload answered with a `Location` header
//! 3. link_only - no provider call, builds a search-by-image link
//! 4. generic_api - bearer-authorized REST endpoint returning result URLs

use async_trait::async_trait;
use lensbot_core::{AppState, BackendKind, ConfigError};
use std::sync::Arc;
use tracing::info;

use crate::error::BackendError;
use crate::types::{SearchQuery, SearchResult};

pub mod vision;
pub mod redirect;
pub mod link_only;
pub mod generic_api;

pub use generic_api::GenericApiBackend;
pub use link_only::LinkOnlyBackend;
pub use redirect::RedirectBackend;
pub use vision::VisionLabelBackend;

/// What a backend needs the orchestrator to hand it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendInput {
    /// Image bytes; URLs are downloaded first.
    Bytes,
    /// The source URL as-is; nothing is downloaded.
    Url,
}

/// SearchBackend trait - all providers implement this interface
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    fn input(&self) -> BackendInput;

    /// Whether the query should carry a scratch copy of the image on disk
    fn wants_local_copy(&self) -> bool {
        false
    }

    /// Run one search. Results must already respect `query.cap`.
    async fn search(&self, query: &SearchQuery) -> Result<SearchResult, BackendError>;
}

/// Builds the backend selected by `SEARCH_BACKEND`.
pub fn from_state(state: &AppState) -> Result<Arc<dyn SearchBackend>, ConfigError> {
    let config = &state.config;
    let key = config.credential().map(str::to_string);
    let endpoint = config.endpoint().map(str::to_string);
    let kind = config.backend()?;

    let backend: Arc<dyn SearchBackend> = match kind {
        BackendKind::Vision => Arc::new(VisionLabelBackend::new(
            state.http.clone(),
            endpoint.unwrap_or_else(|| vision::DEFAULT_ENDPOINT.to_string()),
            key,
        )),
        BackendKind::Redirect => Arc::new(RedirectBackend::new(
            config.http_timeout(),
            endpoint.unwrap_or_else(|| redirect::DEFAULT_ENDPOINT.to_string()),
        )?),
        BackendKind::Link => Arc::new(LinkOnlyBackend::new(
            endpoint.unwrap_or_else(|| link_only::DEFAULT_LINK_BASE.to_string()),
        )),
        BackendKind::Generic => Arc::new(GenericApiBackend::new(
            state.http.clone(),
            endpoint.ok_or(ConfigError::Missing("SEARCH_API_ENDPOINT"))?,
            key,
        )),
    };

    info!("🔌 Search backend: {} ({})", backend.name(), kind);
    Ok(backend)
}
