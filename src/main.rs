//! Relaybot CLI entry point.

use anyhow::Context as _;
use clap::Parser;
use relaybot::agent::{Dispatcher, ResponseTracker};
use relaybot::config::Config;
use relaybot::llm::GenerationBackend;
use relaybot::messaging::{ChatPlatform, DiscordAdapter};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relaybot")]
#[command(about = "Answers Discord conversations through a local or hosted language model")]
struct Cli {
    /// Load environment variables from this file before reading configuration
    #[arg(short, long)]
    env_file: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
        }
        None => {
            // A missing .env is fine; the environment may already be set.
            let _ = dotenvy::dotenv();
        }
    }

    tracing::info!("starting relaybot");

    let config = Config::load().context("failed to load configuration from environment")?;
    tracing::info!(
        mode = %config.backend.mode(),
        history_limit = config.channel.history_limit,
        "configuration loaded"
    );

    let backend = Arc::new(
        GenerationBackend::from_config(&config.backend, &config.generation)
            .await
            .context("failed to initialize generation backend")?,
    );

    let discord = match DiscordAdapter::connect(config.discord_token.clone()).await {
        Ok(discord) => Arc::new(discord),
        Err(error) => {
            backend.shutdown().await;
            return Err(error).context("failed to connect to discord");
        }
    };
    let identity = discord.identity();

    let events = match discord.start().await {
        Ok(events) => events,
        Err(error) => {
            backend.shutdown().await;
            return Err(error).context("failed to start discord gateway");
        }
    };

    let dispatcher = Arc::new(Dispatcher::new(
        discord.clone(),
        backend.clone(),
        ResponseTracker::new(&config.tracker),
        identity,
        config.channel.history_limit,
    ));
    let event_loop = tokio::spawn(dispatcher.run(events));

    tracing::info!(user_id = identity.user_id, "relaybot started");

    tokio::select! {
        _ = event_loop => {
            tracing::info!("event loop ended");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("shutting down");
    if let Err(error) = discord.shutdown().await {
        tracing::warn!(%error, "discord shutdown failed");
    }
    backend.shutdown().await;

    tracing::info!("relaybot stopped");
    Ok(())
}
