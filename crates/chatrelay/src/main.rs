//! chatrelay daemon - WebSocket chat relay with quota accounting

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::RelayError;
use chatrelay::config::{Config, RuntimeSettings, SettingsHandle};
use chatrelay::error::Result;
use chatrelay::provider::OpenAiCompatibleProvider;
use chatrelay::relay::{RelayServices, SessionManager, WordlistModerator};
use chatrelay::server::{AppState, RelayServer};
use chatrelay::services::{InMemoryLedger, QuotaLedger, StaticTokenResolver, TracingRequestLogger};

/// chatrelay - streaming chat relay with quota accounting and provider fallback
#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "A WebSocket relay that streams chat completions with quota accounting")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the relay server (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chatrelay=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting chatrelay daemon");

    let config = Config::load(config_path)?;
    tracing::debug!("Config loaded: {:?}", config);

    let primary = OpenAiCompatibleProvider::new("primary", &config.providers.primary)
        .map_err(|e| RelayError::Provider(format!("primary: {e}")))?;
    let fallback = OpenAiCompatibleProvider::new("fallback", &config.providers.fallback)
        .map_err(|e| RelayError::Provider(format!("fallback: {e}")))?;

    let resolver = StaticTokenResolver::new(config.auth.tokens.clone());
    if resolver.is_empty() {
        tracing::warn!("No auth tokens configured; every connection will be rejected");
    } else {
        tracing::info!("Loaded {} auth tokens", resolver.len());
    }

    let ledger: Arc<dyn QuotaLedger> = Arc::new(InMemoryLedger::from_config(&config.quota));
    let settings = SettingsHandle::new(RuntimeSettings {
        control: config.control.clone(),
        pricing: config.pricing.clone(),
    });

    let services = RelayServices {
        ledger: Arc::clone(&ledger),
        moderator: Arc::new(WordlistModerator::new()),
        primary: Arc::new(primary),
        fallback: Arc::new(fallback),
        identity: Arc::new(resolver),
        logger: Arc::new(TracingRequestLogger::new()),
    };
    let sessions = SessionManager::new(services, settings.clone(), &config.relay)?;

    let state = AppState {
        sessions: Arc::new(sessions),
        settings,
        ledger,
        framing: config.relay.framing,
        admin_token: config.admin.token.clone(),
    };

    let server = RelayServer::new(config.server.clone(), state);
    server.serve().await?;

    tracing::info!("chatrelay daemon stopped");
    Ok(())
}
