//! High score bot - command-line entry point.

#![warn(missing_docs)]

mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, PolicyArg};
use highscore_bot::{
    BotConfig, Dispatcher, EventRouter, OutboundChannel, PlayerStore, SqlitePlayerStore,
    TelegramChannel, TracingChannel,
};
use tracing::{info, instrument, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    initialize_tracing();

    let mut config = load_config(&cli.config)?;
    if let Some(db_path) = cli.db_path {
        config.set_db_path(db_path);
    }

    match cli.command {
        Command::Serve { host, port, policy } => run_server(config, host, port, policy).await,
        Command::Migrate => migrate(&config),
        Command::Show { id } => show(&config, id).await,
    }
}

fn initialize_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,highscore_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[instrument(skip(path), fields(path = %path.display()))]
fn load_config(path: &Path) -> Result<BotConfig> {
    if path.exists() {
        return Ok(BotConfig::from_file(path)?);
    }
    info!("Config file not found, using defaults");
    Ok(BotConfig::default())
}

fn open_store(config: &BotConfig) -> Result<SqlitePlayerStore> {
    let database = config.database();
    Ok(SqlitePlayerStore::open(
        database.path().clone(),
        database.timeout(),
    )?)
}

/// Run the webhook server until Ctrl+C, then drain the mailboxes.
#[instrument(skip(config))]
async fn run_server(
    mut config: BotConfig,
    host: Option<String>,
    port: Option<u16>,
    policy: Option<PolicyArg>,
) -> Result<()> {
    config.set_bind(host, port);
    if let Some(policy) = policy {
        config.set_policy(policy.into());
    }

    let store: Arc<dyn PlayerStore> = Arc::new(open_store(&config)?);

    let channel: Arc<dyn OutboundChannel> = match std::env::var("TELEGRAM_TOKEN") {
        Ok(token) if !token.trim().is_empty() => {
            info!("Replying through the Telegram Bot API");
            Arc::new(TelegramChannel::new(config.telegram().api_base(), token.trim()))
        }
        _ => {
            warn!("TELEGRAM_TOKEN not set, replies will only be logged");
            Arc::new(TracingChannel)
        }
    };

    let router = EventRouter::new(store, channel, &config);
    let dispatcher = Dispatcher::new(router, config.dispatcher());

    let server = config.server();
    let listener =
        tokio::net::TcpListener::bind((server.host().as_str(), *server.port())).await?;

    highscore_bot::serve(listener, dispatcher.clone(), async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Could not listen for Ctrl+C, serving until killed");
            std::future::pending::<()>().await;
        }
        info!("Shutting down");
    })
    .await?;

    dispatcher.shutdown().await;
    Ok(())
}

/// Apply pending migrations.
fn migrate(config: &BotConfig) -> Result<()> {
    let store = open_store(config)?;
    info!(path = %store.db_path(), "Database is up to date");
    Ok(())
}

/// Print a player's record.
async fn show(config: &BotConfig, id: i64) -> Result<()> {
    let store = open_store(config)?;
    match store.get(id).await? {
        Some(record) => println!(
            "id: {}\nname: {}\nhigh score: {}\nupdated: {}",
            record.id(),
            record.display_name().as_deref().unwrap_or("-"),
            record.high_score(),
            record.updated_at()
        ),
        None => println!("No player with id {id}"),
    }
    Ok(())
}
