use lensbot_core::config::{DEFAULT_RESULT_CAP, PLATFORM_MAX_RESULTS};
use std::path::PathBuf;

/// An image as handed to a search backend: either the raw upload or a remote URL.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageRef {
    Bytes { data: Vec<u8>, content_type: String },
    Url(String),
}

impl ImageRef {
    pub fn bytes(data: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self::Bytes {
            data,
            content_type: content_type.into(),
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            Self::Bytes { .. } => None,
        }
    }

    pub fn data(&self) -> Option<(&[u8], &str)> {
        match self {
            Self::Bytes { data, content_type } => Some((data, content_type)),
            Self::Url(_) => None,
        }
    }

    /// Short form for logs; never includes the payload.
    pub fn describe(&self) -> String {
        match self {
            Self::Bytes { data, content_type } => format!("{} bytes ({})", data.len(), content_type),
            Self::Url(url) => url.clone(),
        }
    }
}

/// Number of results a reply may carry, always within `1..=PLATFORM_MAX_RESULTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultCap(usize);

impl ResultCap {
    pub fn new(cap: usize) -> Option<Self> {
        (1..=PLATFORM_MAX_RESULTS).contains(&cap).then_some(Self(cap))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for ResultCap {
    fn default() -> Self {
        Self(DEFAULT_RESULT_CAP)
    }
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub image: ImageRef,
    pub cap: ResultCap,
    /// Scratch copy of the image, present only for backends that asked for one.
    pub local_copy: Option<PathBuf>,
}

impl SearchQuery {
    pub fn new(image: ImageRef, cap: ResultCap) -> Self {
        Self {
            image,
            cap,
            local_copy: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub url: String,
    /// Relevance in `0.0..=1.0` when the provider reports one.
    pub score: Option<f32>,
    pub image_url: Option<String>,
}

impl Match {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            score: None,
            image_url: None,
        }
    }

    pub fn with_score(mut self, score: Option<f32>) -> Self {
        self.score = score.filter(|s| s.is_finite()).map(|s| s.clamp(0.0, 1.0));
        self
    }

    pub fn with_image(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url.filter(|u| !u.trim().is_empty());
        self
    }
}

/// How a result should be laid out, set by the normalizer that built it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Layout {
    /// One display block per match, up to the cap.
    #[default]
    PerMatch,
    /// A single block with labels, the top pages and a sample of similar images.
    Summary,
}

/// Normalized provider output. `matches` keeps provider order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub matches: Vec<Match>,
    pub labels: Vec<String>,
    pub similar_images: Vec<String>,
    pub layout: Layout,
}

impl SearchResult {
    pub fn single(m: Match) -> Self {
        Self {
            matches: vec![m],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty() && self.labels.is_empty() && self.similar_images.is_empty()
    }

    /// Enforces `matches.len() <= cap`.
    pub fn capped(mut self, cap: ResultCap) -> Self {
        self.matches.truncate(cap.get());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_rejects_zero_and_values_above_ceiling() {
        assert!(ResultCap::new(0).is_none());
        assert!(ResultCap::new(11).is_none());
        assert_eq!(ResultCap::new(10).map(ResultCap::get), Some(10));
        assert_eq!(ResultCap::default().get(), 9);
    }

    #[test]
    fn scores_are_bounded() {
        assert_eq!(Match::new("a").with_score(Some(1.7)).score, Some(1.0));
        assert_eq!(Match::new("a").with_score(Some(-0.2)).score, Some(0.0));
        assert_eq!(Match::new("a").with_score(Some(f32::NAN)).score, None);
    }

    #[test]
    fn capped_keeps_leading_matches_in_order() {
        let result = SearchResult {
            matches: (0..12).map(|i| Match::new(format!("https://m/{}", i))).collect(),
            ..SearchResult::default()
        }
        .capped(ResultCap::new(3).unwrap());
        let urls: Vec<_> = result.matches.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(urls, ["https://m/0", "https://m/1", "https://m/2"]);
    }
}
