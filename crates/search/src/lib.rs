//! LensBot Search - reverse image search pipeline
//!
//! This crate is organized into:
//! - types: Core data structures (ImageRef, SearchQuery, SearchResult, Match)
//! - error: Typed failures and their user-facing text
//! - resolver: Picks the image out of an inbound event
//! - fetch: Byte acquisition and request-scoped scratch files
//! - canonical: URL canonicalization
//! - backends: Provider strategies behind the SearchBackend trait
//! - render: Turns a SearchResult into display blocks
//! - orchestrator: Sequences the stages and owns the reply transition

mod types;
mod error;
mod canonical;

pub mod resolver;
pub mod fetch;
pub mod backends;
pub mod render;
pub mod orchestrator;

// Re-export public types
pub use types::{ImageRef, Layout, Match, ResultCap, SearchQuery, SearchResult};
pub use error::{BackendError, BackendErrorKind, FetchError, SearchError, TransportReplyError};
pub use canonical::canonicalize;
pub use resolver::{Attachment, AttachmentResolver, InboundEvent};
pub use fetch::{Fetcher, ScratchFile};
pub use backends::{BackendInput, SearchBackend};
pub use render::{DisplayBlock, Field, RenderedReply, ResultRenderer, Tone};
pub use orchestrator::{Outcome, Reply, ReplyTransport, SearchOrchestrator, Stage};
