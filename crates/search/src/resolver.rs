//! Attachment resolution
//!
//! Picks at most one image reference out of an inbound chat event. Nothing is
//! downloaded here; a missing image is a normal outcome, not an error.

use crate::types::ImageRef;
use url::Url;

/// Platform-neutral view of a message or slash-command invocation.
#[derive(Debug, Clone, Default)]
pub struct InboundEvent {
    /// Unique per request; used for logs and scratch file names.
    pub request_id: String,
    pub attachments: Vec<Attachment>,
    /// Free-text argument, e.g. the `url` option of `/search`.
    pub argument: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Attachment {
    pub filename: String,
    pub content_type: Option<String>,
    pub url: Option<String>,
    /// Already-downloaded content, for channels that read uploads eagerly.
    pub data: Option<Vec<u8>>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false)
    }
}

pub struct AttachmentResolver;

impl AttachmentResolver {
    /// First image attachment wins, then a URL-looking argument.
    pub fn resolve(event: &InboundEvent) -> Option<ImageRef> {
        let from_attachment = event
            .attachments
            .iter()
            .filter(|a| a.is_image())
            .find_map(|a| {
                let content_type = a.content_type.clone().unwrap_or_default();
                match (&a.data, &a.url) {
                    (Some(data), _) => Some(ImageRef::bytes(data.clone(), content_type)),
                    (None, Some(url)) => Some(ImageRef::Url(url.clone())),
                    (None, None) => None,
                }
            });

        from_attachment.or_else(|| {
            event
                .argument
                .as_deref()
                .map(str::trim)
                .filter(|arg| looks_like_url(arg))
                .map(|arg| ImageRef::Url(arg.to_string()))
        })
    }
}

fn looks_like_url(arg: &str) -> bool {
    Url::parse(arg)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}
