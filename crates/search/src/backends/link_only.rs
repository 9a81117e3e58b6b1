//! Link-only backend: builds a search-by-image link, calls nothing.

use super::{BackendInput, SearchBackend};
use crate::canonical::canonicalize;
use crate::error::BackendError;
use crate::types::{Match, SearchQuery, SearchResult};
use async_trait::async_trait;

pub const DEFAULT_LINK_BASE: &str = "https://www.google.com/searchbyimage?image_url=";

pub struct LinkOnlyBackend {
    base: String,
}

impl LinkOnlyBackend {
    pub fn new(base: String) -> Self {
        Self { base }
    }

    pub fn link_for(&self, source: &str) -> Result<String, BackendError> {
        Ok(format!("{}{}", self.base, canonicalize(source)?))
    }
}

impl Default for LinkOnlyBackend {
    fn default() -> Self {
        Self::new(DEFAULT_LINK_BASE.to_string())
    }
}

#[async_trait]
impl SearchBackend for LinkOnlyBackend {
    fn name(&self) -> &'static str {
        "link_only"
    }

    fn input(&self) -> BackendInput {
        BackendInput::Url
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResult, BackendError> {
        let source = query
            .image
            .url()
            .ok_or_else(|| BackendError::invalid_input("link-only search needs a public image URL"))?;

        let canonical = canonicalize(source)?;
        let link = self.link_for(&canonical)?;

        Ok(SearchResult::single(
            Match::new(link).with_score(Some(0.0)).with_image(Some(canonical)),
        ))
    }
}
