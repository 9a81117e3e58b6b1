use std::fmt;
use thiserror::Error;

/// Everything that can end a request before a result is rendered.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("No image attachment or URL supplied")]
    InputMissing,
    #[error("Image fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Search backend failed: {0}")]
    Backend(#[from] BackendError),
    #[error("Reply rendering failed: {0}")]
    Render(String),
    #[error("{0}")]
    Reply(#[from] TransportReplyError),
    #[error("Request cancelled before a reply was sent")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Timed out")]
    Timeout,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Image exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("Scratch file error: {0}")]
    Scratch(#[from] std::io::Error),
}

impl FetchError {
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Provider answered but reported a failure (possibly inside a 200).
    ProviderError,
    TransportError,
    NoRedirect,
    MissingCredential,
    EmptyResult,
    InvalidInput,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ProviderError => "provider error",
            Self::TransportError => "transport error",
            Self::NoRedirect => "no redirect",
            Self::MissingCredential => "missing credential",
            Self::EmptyResult => "empty result",
            Self::InvalidInput => "invalid input",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
#[error("{kind}: {detail}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub detail: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn provider(detail: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::ProviderError, detail)
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::TransportError, detail)
    }

    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::InvalidInput, detail)
    }

    pub fn missing_credential(backend: &str) -> Self {
        Self::new(
            BackendErrorKind::MissingCredential,
            format!("{} backend needs SEARCH_API_KEY", backend),
        )
    }

    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::transport("provider call timed out")
        } else {
            Self::transport(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
#[error("Reply could not be delivered: {0}")]
pub struct TransportReplyError(pub String);

impl SearchError {
    /// Short text that is safe to show in chat. Full detail goes to the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::InputMissing => "⚠️ Please attach an image or provide an image URL.".to_string(),
            Self::Fetch(FetchError::Timeout) => "⚠️ Timed out while fetching the image.".to_string(),
            Self::Fetch(FetchError::Status(code)) => format!("⚠️ Failed to fetch the image (HTTP {}).", code),
            Self::Fetch(FetchError::Network(_)) => "⚠️ Failed to fetch the image from that URL.".to_string(),
            Self::Fetch(FetchError::TooLarge { limit }) => {
                format!("⚠️ That image is too large (limit {} MB).", limit / (1024 * 1024))
            }
            Self::Fetch(FetchError::Scratch(_)) => "❌ Could not stage the image for upload.".to_string(),
            Self::Backend(e) => match e.kind {
                BackendErrorKind::ProviderError => {
                    format!("❌ Search provider returned an error: {}", short_diagnostic(&e.detail))
                }
                BackendErrorKind::TransportError => "❌ Could not reach the search provider.".to_string(),
                BackendErrorKind::NoRedirect => "⚠️ The search endpoint did not return a results link.".to_string(),
                BackendErrorKind::MissingCredential => "❌ The search provider is not configured.".to_string(),
                BackendErrorKind::EmptyResult => "⚠️ No matches found for this image.".to_string(),
                BackendErrorKind::InvalidInput => "⚠️ That doesn't look like a usable image URL.".to_string(),
            },
            Self::Render(_) => "❌ Could not format the search results.".to_string(),
            Self::Reply(_) => "❌ Could not send the reply.".to_string(),
            Self::Cancelled => "⌛ Search cancelled.".to_string(),
        }
    }

    pub fn backend_kind(&self) -> Option<BackendErrorKind> {
        match self {
            Self::Backend(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// First line of a provider message, bounded so nothing verbose reaches chat.
fn short_diagnostic(detail: &str) -> String {
    const LIMIT: usize = 120;
    let line = detail.lines().next().unwrap_or_default().trim();
    if line.chars().count() > LIMIT {
        let cut: String = line.chars().take(LIMIT).collect();
        format!("{}…", cut)
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_detail_is_shortened_to_one_line() {
        let detail = format!("quota exceeded\n{}", "trace ".repeat(100));
        let msg = SearchError::from(BackendError::provider(detail)).user_message();
        assert_eq!(msg, "❌ Search provider returned an error: quota exceeded");

        let long = "x".repeat(500);
        let msg = SearchError::from(BackendError::provider(long)).user_message();
        assert!(msg.chars().count() < 200);
        assert!(msg.ends_with('…'));
    }

    #[test]
    fn transport_detail_never_reaches_user() {
        let err = SearchError::from(BackendError::transport("dns error: lookup vision.internal failed"));
        assert!(!err.user_message().contains("vision.internal"));
        assert_eq!(err.backend_kind(), Some(BackendErrorKind::TransportError));
    }

    #[test]
    fn fetch_messages_mention_status() {
        let err = SearchError::from(FetchError::Status(404));
        assert_eq!(err.user_message(), "⚠️ Failed to fetch the image (HTTP 404).");
        let err = SearchError::from(FetchError::TooLarge { limit: 20 * 1024 * 1024 });
        assert!(err.user_message().contains("20 MB"));
    }
}
