//! Search orchestration
//!
//! Runs one request through resolve → fetch → search → render and owns the
//! single "processing → result/error" transition on the chat surface.
//!
//! Stages: Idle → AwaitingInput → Resolving → Fetching → Searching → Rendering
//! → Replied, with Errored reachable from every non-terminal stage.

use async_trait::async_trait;
use lensbot_core::{AppState, ConfigError};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backends::{self, BackendInput, SearchBackend};
use crate::error::{SearchError, TransportReplyError};
use crate::fetch::{Fetcher, ScratchFile};
use crate::render::{RenderedReply, ResultRenderer};
use crate::resolver::{AttachmentResolver, InboundEvent};
use crate::types::{ResultCap, SearchQuery};

pub const PROCESSING_NOTICE: &str = "🔎 Searching for this image…";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    AwaitingInput,
    Resolving,
    Fetching,
    Searching,
    Rendering,
    Replied,
    Errored,
}

/// Final message handed to the chat surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Rendered(RenderedReply),
}

/// Chat-side half of a request. Adapters implement this per platform.
#[async_trait]
pub trait ReplyTransport: Send {
    /// Post the transient "processing" notice.
    async fn notify_processing(&mut self, text: &str) -> Result<(), TransportReplyError>;

    /// Deliver the final reply, replacing the notice if one was posted.
    /// Called at most once per request.
    async fn deliver(&mut self, reply: Reply) -> Result<(), TransportReplyError>;
}

#[derive(Debug)]
pub struct Outcome {
    pub stage: Stage,
    pub error: Option<SearchError>,
    pub delivered: bool,
    /// Every stage entered, in order.
    pub trail: Vec<Stage>,
}

pub struct SearchOrchestrator {
    backend: Arc<dyn SearchBackend>,
    fetcher: Fetcher,
    cap: ResultCap,
}

impl SearchOrchestrator {
    pub fn new(state: &AppState) -> Result<Self, ConfigError> {
        let cap = ResultCap::new(state.config.result_cap).ok_or_else(|| ConfigError::Invalid {
            key: "RESULT_CAP",
            reason: format!("{} is out of range", state.config.result_cap),
        })?;
        Ok(Self::with_backend(backends::from_state(state)?, Fetcher::from_state(state), cap))
    }

    pub fn with_backend(backend: Arc<dyn SearchBackend>, fetcher: Fetcher, cap: ResultCap) -> Self {
        Self { backend, fetcher, cap }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn cap(&self) -> ResultCap {
        self.cap
    }

    pub fn backend_input(&self) -> BackendInput {
        self.backend.input()
    }

    /// Handles one inbound event end to end. Never panics on provider failures;
    /// every error becomes a short user-safe reply (except cancellation, which sends nothing).
    pub async fn handle(
        &self,
        event: &InboundEvent,
        transport: &mut dyn ReplyTransport,
        cancel: &CancellationToken,
    ) -> Outcome {
        let mut tracker = StageTracker::new(&event.request_id);
        tracker.enter(Stage::AwaitingInput);

        let result = self.pipeline(event, transport, cancel, &mut tracker).await;

        let (reply, error) = match result {
            Ok(rendered) => {
                if rendered.is_warning() {
                    info!("📭 [{}] Nothing useful found via {}", event.request_id, self.backend.name());
                }
                (Reply::Rendered(rendered), None)
            }
            Err(SearchError::Cancelled) => return tracker.abandon(),
            Err(e) => {
                match &e {
                    SearchError::InputMissing => info!("📭 [{}] No image in request", event.request_id),
                    other => error!("❌ [{}] Search failed via {}: {}", event.request_id, self.backend.name(), other),
                }
                (Reply::Text(e.user_message()), Some(e))
            }
        };

        if cancel.is_cancelled() {
            return tracker.abandon();
        }

        let delivered = match transport.deliver(reply).await {
            Ok(()) => true,
            Err(e) => {
                // Terminal: no second attempt.
                error!("📪 [{}] {}", event.request_id, e);
                return tracker.finish(Stage::Errored, Some(error.unwrap_or(SearchError::Reply(e))), false);
            }
        };

        match error {
            None => tracker.finish(Stage::Replied, None, delivered),
            Some(e) => tracker.finish(Stage::Errored, Some(e), delivered),
        }
    }

    async fn pipeline(
        &self,
        event: &InboundEvent,
        transport: &mut dyn ReplyTransport,
        cancel: &CancellationToken,
        tracker: &mut StageTracker,
    ) -> Result<RenderedReply, SearchError> {
        let image = AttachmentResolver::resolve(event).ok_or(SearchError::InputMissing)?;

        tracker.enter(Stage::Resolving);
        info!("🖼 [{}] Image: {} → {}", event.request_id, image.describe(), self.backend.name());

        tracker.enter(Stage::Fetching);
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        if let Err(e) = transport.notify_processing(PROCESSING_NOTICE).await {
            warn!("⚠️ [{}] Processing notice not posted: {}", event.request_id, e);
        }

        let image = match self.backend.input() {
            BackendInput::Bytes => {
                cancellable(cancel, async { self.fetcher.acquire(image).await.map_err(SearchError::from) }).await?
            }
            BackendInput::Url => image,
        };

        // Lives until the search returns; dropping it deletes the file on every path.
        let mut scratch: Option<ScratchFile> = None;
        let mut query = SearchQuery::new(image, self.cap);
        if self.backend.wants_local_copy() {
            if let Some((data, _)) = query.image.data() {
                let file = cancellable(cancel, async {
                    self.fetcher.scratch_copy(&event.request_id, data).await.map_err(SearchError::from)
                })
                .await?;
                query.local_copy = Some(file.path().to_path_buf());
                scratch = Some(file);
            }
        }

        tracker.enter(Stage::Searching);
        let result = cancellable(cancel, async { self.backend.search(&query).await.map_err(SearchError::from) }).await;
        drop(scratch);
        let result = result?.capped(self.cap);

        tracker.enter(Stage::Rendering);
        ResultRenderer::render(&result, self.cap)
    }
}

/// Races `fut` against the token; cancellation wins ties.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, SearchError>>,
) -> Result<T, SearchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SearchError::Cancelled),
        res = fut => res,
    }
}

struct StageTracker {
    request_id: String,
    trail: Vec<Stage>,
}

impl StageTracker {
    fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            trail: vec![Stage::Idle],
        }
    }

    fn current(&self) -> Stage {
        self.trail.last().copied().unwrap_or(Stage::Idle)
    }

    fn enter(&mut self, next: Stage) {
        debug!("[{}] {:?} → {:?}", self.request_id, self.current(), next);
        self.trail.push(next);
    }

    fn abandon(mut self) -> Outcome {
        warn!("⌛ [{}] Cancelled during {:?}; nothing sent", self.request_id, self.current());
        self.enter(Stage::Errored);
        Outcome {
            stage: Stage::Errored,
            error: Some(SearchError::Cancelled),
            delivered: false,
            trail: self.trail,
        }
    }

    fn finish(mut self, stage: Stage, error: Option<SearchError>, delivered: bool) -> Outcome {
        self.enter(stage);
        if stage == Stage::Replied {
            info!("✅ [{}] Replied", self.request_id);
        }
        Outcome {
            stage,
            error,
            delivered,
            trail: self.trail,
        }
    }
}
