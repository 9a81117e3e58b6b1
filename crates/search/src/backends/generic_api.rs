//! Generic REST backend: bearer-authorized endpoint returning result URLs.

use super::{BackendInput, SearchBackend};
use crate::canonical::canonicalize;
use crate::error::{BackendError, BackendErrorKind};
use crate::types::{Match, ResultCap, SearchQuery, SearchResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

pub struct GenericApiBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GenericApiBackend {
    pub fn new(http: reqwest::Client, endpoint: String, api_key: Option<String>) -> Self {
        Self {
            http,
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl SearchBackend for GenericApiBackend {
    fn name(&self) -> &'static str {
        "generic_api"
    }

    fn input(&self) -> BackendInput {
        BackendInput::Url
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResult, BackendError> {
        // Checked first: no credential means no request at all.
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BackendError::missing_credential(self.name()))?;
        let source = query
            .image
            .url()
            .ok_or_else(|| BackendError::invalid_input("generic API search needs a public image URL"))?;
        let canonical = canonicalize(source)?;

        let limit = query.cap.get().to_string();
        let response = self
            .http
            .get(&self.endpoint)
            .bearer_auth(key)
            .query(&[("url", canonical.as_str()), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(BackendError::from_reqwest)?;
        if !status.is_success() {
            warn!("⚠️ Search API answered {}: {}", status, body);
            return Err(BackendError::transport(format!("search API returned HTTP {}", status)));
        }

        parse_results(&body, query.cap)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    List(Vec<Entry>),
    Wrapped { results: Vec<Entry> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entry {
    Url(String),
    Detailed {
        url: String,
        #[serde(default, alias = "thumbnail", alias = "imageUrl")]
        image_url: Option<String>,
        #[serde(default)]
        score: Option<f32>,
    },
}

impl Entry {
    fn into_match(self) -> Option<Match> {
        let m = match self {
            // A bare URL is the matched image itself.
            Entry::Url(url) => Match::new(url.clone()).with_image(Some(url)),
            Entry::Detailed { url, image_url, score } => Match::new(url).with_image(image_url).with_score(score),
        };
        (!m.url.trim().is_empty()).then_some(m)
    }
}

pub(crate) fn parse_results(body: &str, cap: ResultCap) -> Result<SearchResult, BackendError> {
    let payload: Payload = serde_json::from_str(body)
        .map_err(|e| BackendError::provider(format!("unexpected search API response: {}", e)))?;

    let entries = match payload {
        Payload::List(entries) | Payload::Wrapped { results: entries } => entries,
    };

    let matches: Vec<Match> = entries.into_iter().filter_map(Entry::into_match).take(cap.get()).collect();
    debug!("Search API returned {} usable matches", matches.len());

    if matches.is_empty() {
        return Err(BackendError::new(BackendErrorKind::EmptyResult, "provider returned no matches"));
    }

    Ok(SearchResult {
        matches,
        ..SearchResult::default()
    })
}
