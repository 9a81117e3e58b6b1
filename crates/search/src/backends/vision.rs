//! Vision annotation backend (web detection)

use super::{BackendInput, SearchBackend};
use crate::error::BackendError;
use crate::types::{Layout, Match, ResultCap, SearchQuery, SearchResult};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

pub struct VisionLabelBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl VisionLabelBackend {
    pub fn new(http: reqwest::Client, endpoint: String, api_key: Option<String>) -> Self {
        Self {
            http,
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl SearchBackend for VisionLabelBackend {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn input(&self) -> BackendInput {
        BackendInput::Bytes
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResult, BackendError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BackendError::missing_credential(self.name()))?;
        let (data, _) = query
            .image
            .data()
            .ok_or_else(|| BackendError::invalid_input("vision backend expects image bytes"))?;

        let body = serde_json::json!({
            "requests": [{
                "image": { "content": base64::engine::general_purpose::STANDARD.encode(data) },
                "features": [{ "type": "WEB_DETECTION", "maxResults": query.cap.get() }],
            }]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        let status = response.status();
        let text = response.text().await.map_err(BackendError::from_reqwest)?;
        if !status.is_success() {
            warn!("⚠️ Vision API answered {}: {}", status, text);
            return Err(BackendError::transport(format!("vision API returned HTTP {}", status)));
        }

        parse_web_detection(&text, query.cap)
    }
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    web_detection: Option<WebDetection>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebDetection {
    #[serde(default)]
    best_guess_labels: Vec<Label>,
    #[serde(default)]
    pages_with_matching_images: Vec<WebPage>,
    #[serde(default)]
    visually_similar_images: Vec<WebImage>,
}

#[derive(Debug, Deserialize)]
struct Label {
    #[serde(default)]
    label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebPage {
    url: String,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    full_matching_images: Vec<WebImage>,
}

#[derive(Debug, Deserialize)]
struct WebImage {
    url: String,
}

/// Maps an annotate response body into a `SearchResult`.
/// An embedded error message fails the call even when the HTTP status was 200.
pub(crate) fn parse_web_detection(body: &str, cap: ResultCap) -> Result<SearchResult, BackendError> {
    let parsed: AnnotateResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::provider(format!("unreadable vision response: {}", e)))?;

    let Some(first) = parsed.responses.into_iter().next() else {
        return Ok(SearchResult {
            layout: Layout::Summary,
            ..SearchResult::default()
        });
    };

    if let Some(message) = first.error.map(|s| s.message).filter(|m| !m.trim().is_empty()) {
        return Err(BackendError::provider(message));
    }

    let detection = first.web_detection.unwrap_or_default();
    debug!(
        "Vision: {} labels, {} pages, {} similar",
        detection.best_guess_labels.len(),
        detection.pages_with_matching_images.len(),
        detection.visually_similar_images.len()
    );

    let labels = detection
        .best_guess_labels
        .into_iter()
        .map(|l| l.label.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let matches = detection
        .pages_with_matching_images
        .into_iter()
        .filter(|p| !p.url.trim().is_empty())
        .map(|p| {
            let image = p.full_matching_images.into_iter().next().map(|i| i.url);
            Match::new(p.url).with_score(p.score).with_image(image)
        })
        .collect();

    let similar_images = detection
        .visually_similar_images
        .into_iter()
        .map(|i| i.url)
        .filter(|u| !u.trim().is_empty())
        .take(cap.get())
        .collect();

    Ok(SearchResult {
        matches,
        labels,
        similar_images,
        layout: Layout::Summary,
    }
    .capped(cap))
}
