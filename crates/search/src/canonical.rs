use crate::error::BackendError;
use url::Url;

/// Strips query string and fragment so the same image always yields the same link.
/// Only absolute http(s) URLs are accepted. The remaining text is returned as
/// given; `Url` only validates it.
pub fn canonicalize(raw: &str) -> Result<String, BackendError> {
    let trimmed = raw.trim();
    let stripped = match trimmed.find(['?', '#']) {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };

    let url = Url::parse(stripped)
        .map_err(|e| BackendError::invalid_input(format!("malformed URL '{}': {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none_or(str::is_empty) {
        return Err(BackendError::invalid_input(format!("not an http(s) URL: {}", raw)));
    }

    Ok(stripped.to_string())
}
