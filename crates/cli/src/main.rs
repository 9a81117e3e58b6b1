use async_trait::async_trait;
use clap::{Parser, Subcommand};
use lensbot_core::{AppConfig, AppState};
use lensbot_discord::DiscordChannel;
use lensbot_search::{
    Attachment, InboundEvent, Reply, ReplyTransport, SearchOrchestrator, Stage, TransportReplyError,
};
use lensbot_telegram::TelegramChannel;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "LensBot - Reverse image search for chat", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Run the Discord bot (default)
    Discord,
    /// Run the Telegram bot
    Telegram,
    /// One-shot search for an image URL or local file
    Search {
        /// Image URL or path to a local image
        #[arg(index = 1)]
        target: String,
        /// Override SEARCH_BACKEND for this run
        #[arg(long)]
        backend: Option<String>,
        /// Override RESULT_CAP for this run
        #[arg(long)]
        cap: Option<usize>,
    },
    /// Print the resolved configuration (secrets masked)
    Check,
}

impl Commands {
    fn is_long_running(&self) -> bool {
        matches!(self, Commands::Discord | Commands::Telegram)
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let command = args.command.unwrap_or(Commands::Discord);
    let _guard = init_logging(command.is_long_running());

    lensbot_core::init();

    let config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ Error: Configuration missing or invalid: {}", e);
            eprintln!("   Check the environment or ~/.lensbot/.env, then run 'lensbot check'.");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(command, config).await {
        error!("❌ {:#}", e);
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

/// Bot modes log to `<app root>/lensbot.log` and stderr; one-shot commands only to stderr.
fn init_logging(long_running: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let log_file = long_running
        .then(|| {
            let app_dir = lensbot_core::path_utils::get_app_root();
            std::fs::create_dir_all(&app_dir).ok()?;
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(app_dir.join("lensbot.log"))
                .ok()
        })
        .flatten();

    match log_file {
        Some(file) => {
            use tracing_subscriber::layer::SubscriberExt;
            use tracing_subscriber::util::SubscriberInitExt;

            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(filter())
                .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .init();
            None
        }
    }
}

async fn run(command: Commands, mut config: AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Check => {
            println!("{}", serde_json::to_string_pretty(&config.summary())?);
            Ok(())
        }
        Commands::Discord => {
            let state = Arc::new(AppState::new(config)?);
            let channel = DiscordChannel::new(state)?;
            shutdown_on_ctrl_c(channel.shutdown_token());
            channel.start().await
        }
        Commands::Telegram => {
            let state = Arc::new(AppState::new(config)?);
            TelegramChannel::new(state)?.start().await
        }
        Commands::Search { target, backend, cap } => {
            if let Some(backend) = backend {
                config.search_backend = backend;
            }
            if let Some(cap) = cap {
                config.result_cap = cap;
            }
            config.validate()?;

            let state = AppState::new(config)?;
            let orchestrator = SearchOrchestrator::new(&state)?;
            let event = search_event(&target, uuid::Uuid::new_v4().to_string())?;

            let cancel = CancellationToken::new();
            shutdown_on_ctrl_c(cancel.clone());

            let mut transport = StdoutTransport;
            let outcome = orchestrator.handle(&event, &mut transport, &cancel).await;
            match (outcome.stage, outcome.error) {
                (Stage::Replied, _) => Ok(()),
                (_, Some(e)) => Err(anyhow::anyhow!("Search failed: {}", e)),
                (stage, None) => Err(anyhow::anyhow!("Search ended in {:?}", stage)),
            }
        }
    }
}

fn shutdown_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Ctrl-C received, shutting down");
            token.cancel();
        }
    });
}

/// A local file becomes an inline attachment; anything else is treated as a URL argument.
fn search_event(target: &str, request_id: String) -> anyhow::Result<InboundEvent> {
    let path = Path::new(target);
    if !path.is_file() {
        return Ok(InboundEvent {
            request_id,
            attachments: Vec::new(),
            argument: Some(target.to_string()),
        });
    }

    let data = std::fs::read(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());

    Ok(InboundEvent {
        request_id,
        attachments: vec![Attachment {
            content_type: content_type_for(path).map(str::to_string),
            filename,
            url: None,
            data: Some(data),
        }],
        argument: None,
    })
}

fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => return None,
    };
    Some(content_type)
}

/// Notice to stderr, reply to stdout.
struct StdoutTransport;

#[async_trait]
impl ReplyTransport for StdoutTransport {
    async fn notify_processing(&mut self, text: &str) -> Result<(), TransportReplyError> {
        eprintln!("{}", text);
        Ok(())
    }

    async fn deliver(&mut self, reply: Reply) -> Result<(), TransportReplyError> {
        match reply {
            Reply::Text(text) => println!("{}", text),
            Reply::Rendered(rendered) => println!("{}", rendered.to_plain_text()),
        }
        Ok(())
    }
}
