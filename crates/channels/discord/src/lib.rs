//! Discord Channel for LensBot
//!
//! Answers image uploads and the `/search` slash command. Every event runs in
//! its own task with a deadline matching the interaction token lifetime.

mod event;
mod transport;

pub use event::{SEARCH_COMMAND, search_command};
pub use transport::{InteractionTransport, MessageTransport, embed};

use lensbot_core::AppState;
use lensbot_search::{InboundEvent, ReplyTransport, SearchOrchestrator};
use serenity::async_trait;
use serenity::model::application::{Command, Interaction};
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Discord interaction tokens stop accepting edits after 15 minutes.
pub const REQUEST_TTL: Duration = Duration::from_secs(15 * 60);

pub struct DiscordChannel {
    state: Arc<AppState>,
    orchestrator: Arc<SearchOrchestrator>,
    shutdown: CancellationToken,
}

impl DiscordChannel {
    pub fn new(state: Arc<AppState>) -> anyhow::Result<Self> {
        let orchestrator = SearchOrchestrator::new(&state)?;
        Ok(Self {
            state,
            orchestrator: Arc::new(orchestrator),
            shutdown: CancellationToken::new(),
        })
    }

    /// Cancelling this token stops the gateway and every in-flight request.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start the Discord gateway listener
    pub async fn start(&self) -> anyhow::Result<()> {
        info!("📡 Discord Gateway Starting...");

        let token = self.state.config.discord_token()?;
        let intents = GatewayIntents::GUILD_MESSAGES | GatewayIntents::DIRECT_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

        let handler = Handler {
            orchestrator: self.orchestrator.clone(),
            react_to_uploads: self.state.config.react_to_uploads,
            shutdown: self.shutdown.clone(),
        };

        let mut client = Client::builder(token, intents).event_handler(handler).await?;
        let shard_manager = client.shard_manager.clone();

        tokio::select! {
            res = client.start() => res?,
            _ = self.shutdown.cancelled() => {
                info!("🛑 Discord Gateway shutting down");
                shard_manager.shutdown_all().await;
            }
        }

        Ok(())
    }
}

struct Handler {
    orchestrator: Arc<SearchOrchestrator>,
    react_to_uploads: bool,
    shutdown: CancellationToken,
}

impl Handler {
    /// Runs the request in its own task so the gateway keeps reading events.
    fn dispatch<T>(&self, event: InboundEvent, mut transport: T)
    where
        T: ReplyTransport + 'static,
    {
        let orchestrator = self.orchestrator.clone();
        let cancel = expiring_token(&self.shutdown, REQUEST_TTL);

        tokio::spawn(async move {
            let outcome = orchestrator.handle(&event, &mut transport, &cancel).await;
            // Releases the deadline timer.
            cancel.cancel();
            debug!("[{}] Finished as {:?} after {:?}", event.request_id, outcome.stage, outcome.trail);
        });
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            "✅ Discord Gateway Active as {} (backend: {}, cap: {})",
            ready.user.name,
            self.orchestrator.backend_name(),
            self.orchestrator.cap().get()
        );

        match Command::set_global_commands(&ctx, vec![search_command()]).await {
            Ok(commands) => info!("🧩 Registered {} slash command(s)", commands.len()),
            Err(e) => error!("❌ Failed to register /{}: {}", SEARCH_COMMAND, e),
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let event = event::from_message(&msg);
        if !event::wants_upload_reply(self.react_to_uploads, msg.author.bot, &event) {
            return;
        }

        info!("📩 [Discord] Image upload from {} in {}", msg.author.name, msg.channel_id);
        let transport = MessageTransport::new(ctx, msg.channel_id, msg.id);
        self.dispatch(event, transport);
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        if command.data.name != SEARCH_COMMAND {
            warn!("⚠️ [Discord] Unknown command /{}", command.data.name);
            return;
        }

        info!("📩 [Discord] /{} from {}", SEARCH_COMMAND, command.user.name);
        let event = event::from_command(&command);
        self.dispatch(event, InteractionTransport::new(ctx, command));
    }
}

/// Child of `parent` that cancels itself after `ttl`.
fn expiring_token(parent: &CancellationToken, ttl: Duration) -> CancellationToken {
    let token = parent.child_token();
    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(ttl) => {
                warn!("⌛ Request deadline of {:?} reached", ttl);
                timer.cancel();
            }
            _ = timer.cancelled() => {}
        }
    });
    token
}
