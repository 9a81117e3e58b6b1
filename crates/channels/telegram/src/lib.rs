//! Telegram Channel for LensBot
//!
//! Long-polls for photos, image documents and `/search <url>` commands. Uploads
//! are downloaded here, so the search pipeline always receives bytes for them.

use async_trait::async_trait;
use lensbot_core::AppState;
use lensbot_search::{
    Attachment, BackendInput, FetchError, InboundEvent, Reply, ReplyTransport, SearchError, SearchOrchestrator,
    TransportReplyError,
};
use std::sync::Arc;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileMeta, MessageId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const HELP_TEXT: &str = "🔭 Send me a photo or an image file, or use /search <image url>.";
const URL_ONLY_TEXT: &str = "⚠️ This bot can only search public image links. Use /search <image url> instead of uploading.";
/// Telegram sends photos re-encoded as JPEG.
const PHOTO_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Clone)]
pub struct TelegramChannel {
    token: String,
    allowed_users: Vec<String>,
    max_image_bytes: u64,
    orchestrator: Arc<SearchOrchestrator>,
    shutdown: CancellationToken,
}

impl TelegramChannel {
    pub fn new(state: Arc<AppState>) -> anyhow::Result<Self> {
        let token = state.config.telegram_token()?.to_string();
        let orchestrator = SearchOrchestrator::new(&state)?;
        if !accepts_uploads(orchestrator.backend_input()) {
            warn!(
                "⚠️ Backend '{}' only takes image URLs; Telegram uploads will be answered with a /search hint",
                orchestrator.backend_name()
            );
        }

        Ok(Self {
            token,
            allowed_users: state.config.allowed_users(),
            max_image_bytes: state.config.max_image_bytes,
            orchestrator: Arc::new(orchestrator),
            shutdown: CancellationToken::new(),
        })
    }

    /// Start the Telegram bot listener (Long Polling)
    pub async fn start(&self) -> anyhow::Result<()> {
        info!("📡 Telegram Gateway Starting...");

        let bot = Bot::new(&self.token);
        let channel = self.clone();

        info!(
            "✅ Telegram Gateway Active. Backend: {}. Allowed Users: {:?}",
            self.orchestrator.backend_name(),
            self.allowed_users
        );

        teloxide::repl(bot, move |bot: Bot, msg: Message| {
            let channel = channel.clone();
            async move {
                let user_id = msg.from.as_ref().map(|u| u.id.to_string()).unwrap_or_default();

                // Security Check
                if !is_allowed(&channel.allowed_users, &user_id) {
                    let _ = bot.send_message(msg.chat.id, "⛔ Access Denied.").await;
                    return Ok(());
                }

                let text = msg.text().unwrap_or_default();
                if is_command(text, "start") || is_command(text, "help") {
                    let _ = bot.send_message(msg.chat.id, HELP_TEXT).await;
                    return Ok(());
                }

                let argument = search_argument(text);
                let upload = upload_of(&msg);
                if upload.is_none() && argument.is_none() {
                    debug!("[Telegram] Ignoring message {} from {}", msg.id.0, user_id);
                    return Ok(());
                }

                info!("📩 [Telegram] Search request from {}", user_id);
                let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;

                // Spawn a task so a slow provider doesn't block the next message
                let argument = argument.map(str::to_string);
                tokio::spawn(async move {
                    channel.run(bot, msg, upload, argument).await;
                });
                Ok(())
            }
        })
        .await;

        // Polling stopped (Ctrl-C): abandon whatever is still in flight.
        self.shutdown.cancel();
        Ok(())
    }

    async fn run(&self, bot: Bot, msg: Message, upload: Option<Upload>, argument: Option<String>) {
        let request_id = format!("tg-{}-{}", msg.chat.id.0, msg.id.0);
        let mut transport = TelegramTransport::new(bot.clone(), msg.chat.id);
        let cancel = self.shutdown.child_token();

        let mut event = InboundEvent {
            request_id,
            attachments: Vec::new(),
            argument,
        };

        // A URL-only backend searches the link when one was given alongside the upload.
        let url_only = !accepts_uploads(self.orchestrator.backend_input());
        let has_link = event.argument.as_deref().is_some_and(|a| !a.is_empty());
        let upload = upload.filter(|_| !(url_only && has_link));
        if url_only && upload.is_some() {
            info!("📭 [{}] Upload sent to URL-only backend {}", event.request_id, self.orchestrator.backend_name());
            if let Err(e) = transport.deliver(Reply::Text(URL_ONLY_TEXT.to_string())).await {
                error!("📪 [{}] {}", event.request_id, e);
            }
            return;
        }

        if let Some(upload) = upload {
            match download(&bot, &upload.file, self.max_image_bytes).await {
                Ok(data) => event.attachments.push(Attachment {
                    filename: upload.filename,
                    content_type: Some(upload.content_type),
                    url: None,
                    data: Some(data),
                }),
                Err(e) => {
                    warn!("⚠️ [{}] Telegram download failed: {}", event.request_id, e);
                    let reply = Reply::Text(SearchError::from(e).user_message());
                    if let Err(e) = transport.deliver(reply).await {
                        error!("📪 [{}] {}", event.request_id, e);
                    }
                    return;
                }
            }
        }

        let outcome = self.orchestrator.handle(&event, &mut transport, &cancel).await;
        debug!("[{}] Finished as {:?}", event.request_id, outcome.stage);
    }
}

/// A file the user sent that should be searched.
#[derive(Debug, Clone)]
struct Upload {
    file: FileMeta,
    filename: String,
    content_type: String,
}

fn upload_of(msg: &Message) -> Option<Upload> {
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        // Largest size is last.
        return Some(Upload {
            file: photo.file.clone(),
            filename: "photo.jpg".to_string(),
            content_type: PHOTO_CONTENT_TYPE.to_string(),
        });
    }

    let doc = msg.document()?;
    let content_type = doc.mime_type.as_ref().map(|m| m.to_string())?;
    is_image_type(&content_type).then(|| Upload {
        file: doc.file.clone(),
        filename: doc.file_name.clone().unwrap_or_else(|| "image".to_string()),
        content_type,
    })
}

async fn download(bot: &Bot, file: &FileMeta, max_bytes: u64) -> Result<Vec<u8>, FetchError> {
    if u64::from(file.size) > max_bytes {
        return Err(FetchError::TooLarge { limit: max_bytes });
    }

    let file = bot
        .get_file(file.id.clone())
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;
    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf)
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;

    debug!("Downloaded {} bytes from Telegram", buf.len());
    Ok(buf)
}

/// Posts the notice, then edits it into the final flattened reply.
struct TelegramTransport {
    bot: Bot,
    chat_id: ChatId,
    notice: Option<MessageId>,
}

impl TelegramTransport {
    fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self {
            bot,
            chat_id,
            notice: None,
        }
    }
}

#[async_trait]
impl ReplyTransport for TelegramTransport {
    async fn notify_processing(&mut self, text: &str) -> Result<(), TransportReplyError> {
        let sent = self
            .bot
            .send_message(self.chat_id, text)
            .await
            .map_err(|e| TransportReplyError(format!("Telegram notice failed: {}", e)))?;
        self.notice = Some(sent.id);
        Ok(())
    }

    async fn deliver(&mut self, reply: Reply) -> Result<(), TransportReplyError> {
        let text = match reply {
            Reply::Text(text) => text,
            Reply::Rendered(rendered) => rendered.to_plain_text(),
        };

        let result = match self.notice {
            Some(notice) => self.bot.edit_message_text(self.chat_id, notice, text).await.map(|_| ()),
            None => self.bot.send_message(self.chat_id, text).await.map(|_| ()),
        };
        result.map_err(|e| TransportReplyError(format!("Telegram reply failed: {}", e)))
    }
}

/// Uploads reach the pipeline as bytes, which URL-only backends cannot search.
fn accepts_uploads(input: BackendInput) -> bool {
    input == BackendInput::Bytes
}

fn is_allowed(allowed_users: &[String], user_id: &str) -> bool {
    allowed_users.is_empty() || allowed_users.iter().any(|u| u == user_id)
}

fn is_image_type(content_type: &str) -> bool {
    content_type.trim().to_ascii_lowercase().starts_with("image/")
}

/// `/name` or `/name@botname`, optionally followed by arguments.
fn is_command(text: &str, name: &str) -> bool {
    let Some(head) = text.trim_start().split_whitespace().next() else {
        return false;
    };
    let Some(command) = head.strip_prefix('/') else {
        return false;
    };
    command.split('@').next() == Some(name)
}

/// Argument of `/search`; empty when the command was sent bare.
fn search_argument(text: &str) -> Option<&str> {
    if !is_command(text, "search") {
        return None;
    }
    let trimmed = text.trim_start();
    let rest = trimmed.split_once(char::is_whitespace).map(|(_, rest)| rest).unwrap_or("");
    Some(rest.trim())
}
