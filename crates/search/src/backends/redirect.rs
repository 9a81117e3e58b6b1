//! Upload-and-redirect backend

use super::{BackendInput, SearchBackend};
use crate::error::{BackendError, BackendErrorKind};
use crate::types::{Match, SearchQuery, SearchResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://www.google.com/searchbyimage/upload";

pub struct RedirectBackend {
    /// Dedicated client: redirects must not be followed or the `Location` is lost.
    http: reqwest::Client,
    endpoint: String,
}

impl RedirectBackend {
    pub fn new(timeout: Duration, endpoint: String) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("lensbot/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self { http, endpoint })
    }

    async fn payload(&self, query: &SearchQuery) -> Result<(Vec<u8>, String), BackendError> {
        let (data, content_type) = query
            .image
            .data()
            .ok_or_else(|| BackendError::invalid_input("redirect backend expects image bytes"))?;

        match &query.local_copy {
            Some(path) => {
                let staged = tokio::fs::read(path)
                    .await
                    .map_err(|e| BackendError::transport(format!("scratch copy unreadable: {}", e)))?;
                Ok((staged, content_type.to_string()))
            }
            None => Ok((data.to_vec(), content_type.to_string())),
        }
    }
}

#[async_trait]
impl SearchBackend for RedirectBackend {
    fn name(&self) -> &'static str {
        "redirect"
    }

    fn input(&self) -> BackendInput {
        BackendInput::Bytes
    }

    fn wants_local_copy(&self) -> bool {
        true
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResult, BackendError> {
        let (data, content_type) = self.payload(query).await?;
        debug!("Uploading {} bytes to {}", data.len(), self.endpoint);

        let part = Part::bytes(data)
            .file_name("image")
            .mime_str(&content_type)
            .map_err(|_| BackendError::invalid_input(format!("bad content type '{}'", content_type)))?;
        let form = Form::new().part("encoded_image", part);

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        let status = response.status();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let Some(location) = location else {
            return Err(BackendError::new(
                BackendErrorKind::NoRedirect,
                format!("HTTP {} without a Location header", status),
            ));
        };

        let target = absolute_target(&self.endpoint, &location)?;
        info!("↪️ Search redirect: {}", target);
        Ok(SearchResult::single(Match::new(target)))
    }
}

/// `Location` may be relative to the upload endpoint.
fn absolute_target(endpoint: &str, location: &str) -> Result<String, BackendError> {
    let base = Url::parse(endpoint)
        .map_err(|e| BackendError::invalid_input(format!("bad endpoint '{}': {}", endpoint, e)))?;
    base.join(location)
        .map(|u| u.to_string())
        .map_err(|e| BackendError::provider(format!("unusable redirect '{}': {}", location, e)))
}
