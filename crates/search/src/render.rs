//! Result rendering
//!
//! Turns a normalized `SearchResult` into display blocks the chat adapters can
//! send as embeds (Discord) or flatten into text (Telegram, CLI). The layout
//! follows the hint the normalizer stored on the result, never the backend name.

use crate::error::SearchError;
use crate::types::{Layout, ResultCap, SearchResult};

/// Discord caps embed field values at 1024 characters.
pub const FIELD_CHAR_LIMIT: usize = 1024;
pub const TOP_PAGES: usize = 3;
pub const TOP_SIMILAR: usize = 5;
/// Telegram rejects messages over 4096 characters.
pub const PLAIN_TEXT_LIMIT: usize = 4000;

pub const RESULTS_TITLE: &str = "🔍 Image Search Results";
pub const NO_RESULTS_TEXT: &str = "⚠️ No useful search results found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Results,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Field {
    fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: truncate_chars(value, FIELD_CHAR_LIMIT),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayBlock {
    pub title: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub fields: Vec<Field>,
    pub tone: Tone,
}

impl DisplayBlock {
    fn titled(title: impl Into<String>, tone: Tone) -> Self {
        Self {
            title: title.into(),
            url: None,
            image_url: None,
            fields: Vec::new(),
            tone,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReply {
    pub status: String,
    pub blocks: Vec<DisplayBlock>,
}

impl RenderedReply {
    pub fn is_warning(&self) -> bool {
        self.blocks.iter().all(|b| b.tone == Tone::Warning)
    }

    /// Flattens the reply for surfaces without embeds. Markdown links become bare URLs.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.status);

        for block in &self.blocks {
            if block.title != self.status {
                out.push_str("\n\n");
                out.push_str(&block.title);
            }
            if let Some(url) = &block.url {
                out.push('\n');
                out.push_str(url);
            }
            for field in &block.fields {
                out.push_str("\n\n");
                out.push_str(&field.name);
                out.push('\n');
                out.push_str(&strip_markdown_links(&field.value));
            }
            if let Some(image) = &block.image_url {
                if block.url.as_deref() != Some(image.as_str()) {
                    out.push_str("\n🖼 ");
                    out.push_str(image);
                }
            }
        }

        truncate_chars(&out, PLAIN_TEXT_LIMIT)
    }
}

pub struct ResultRenderer;

impl ResultRenderer {
    pub fn render(result: &SearchResult, cap: ResultCap) -> Result<RenderedReply, SearchError> {
        if let Some(bad) = result.matches.iter().find(|m| m.url.trim().is_empty()) {
            return Err(SearchError::Render(format!("match without URL: {:?}", bad)));
        }

        if result.is_empty() {
            return Ok(Self::no_results());
        }

        let reply = match result.layout {
            Layout::Summary => Self::summary(result),
            Layout::PerMatch if result.matches.is_empty() => Self::no_results(),
            Layout::PerMatch => Self::per_match(result, cap),
        };
        Ok(reply)
    }

    fn no_results() -> RenderedReply {
        RenderedReply {
            status: NO_RESULTS_TEXT.to_string(),
            blocks: vec![DisplayBlock::titled(NO_RESULTS_TEXT, Tone::Warning)],
        }
    }

    /// One block with labels, top pages and similar images.
    fn summary(result: &SearchResult) -> RenderedReply {
        let mut block = DisplayBlock::titled(RESULTS_TITLE, Tone::Results);

        if !result.labels.is_empty() {
            block.fields.push(Field::new("Best Guess", &result.labels.join(", ")));
        }

        if !result.matches.is_empty() {
            let lines: Vec<String> = result
                .matches
                .iter()
                .take(TOP_PAGES)
                .map(|m| match m.score.filter(|s| *s > 0.0) {
                    Some(score) => format!("[{0}]({0}) (score {1:.2})", m.url, score),
                    None => format!("[{0}]({0})", m.url),
                })
                .collect();
            block
                .fields
                .push(Field::new("Pages with Matching Images (Top 3)", &lines.join("\n")));
        }

        if let Some(first) = result.similar_images.first() {
            block.image_url = Some(first.clone());
            let sample: Vec<&str> = result.similar_images.iter().take(TOP_SIMILAR).map(String::as_str).collect();
            block.fields.push(Field::new("Similar Images (sample)", &sample.join("\n")));
        }

        RenderedReply {
            status: RESULTS_TITLE.to_string(),
            blocks: vec![block],
        }
    }

    /// One block per match, up to `cap`.
    fn per_match(result: &SearchResult, cap: ResultCap) -> RenderedReply {
        let blocks: Vec<DisplayBlock> = result
            .matches
            .iter()
            .take(cap.get())
            .enumerate()
            .map(|(i, m)| {
                let mut block = DisplayBlock::titled(format!("Result {}", i + 1), Tone::Results);
                block.url = Some(m.url.clone());
                block.image_url = m.image_url.clone();
                if let Some(score) = m.score.filter(|s| *s > 0.0) {
                    block.fields.push(Field::new("Score", &format!("{:.2}", score)));
                }
                block
            })
            .collect();

        let status = match blocks.len() {
            1 => "🔎 Click the link below to search for this image:".to_string(),
            n => format!("🔎 {} results", n),
        };

        RenderedReply { status, blocks }
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// `[text](url)` -> `url`; everything else is left alone.
fn strip_markdown_links(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find('[') {
        let after = &rest[open..];
        let parsed = after.find("](").and_then(|mid| {
            let tail = &after[mid + 2..];
            tail.find(')').map(|close| (&tail[..close], mid + 2 + close + 1))
        });
        match parsed {
            Some((url, consumed)) => {
                out.push_str(&rest[..open]);
                out.push_str(url);
                rest = &rest[open + consumed..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}
