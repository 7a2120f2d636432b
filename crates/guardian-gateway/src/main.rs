use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use guardian_agent::provider::{GenerationBackend, SamplingOptions};
use guardian_agent::{ConversationService, OllamaBackend};
use guardian_core::config::GuardianConfig;
use guardian_core::GuardianError;
use guardian_moderation::{
    ImageClassifier, ModerationPipeline, ModerationPolicy, RemoteClassifier,
};
use guardian_sessions::{ConversationStore, OverflowPolicy};

mod app;
mod http;

/// Group guardian bot: media moderation plus an AI chat command.
#[derive(Parser, Debug)]
#[command(name = "guardian", version, about)]
struct Cli {
    /// Path to guardian.toml (defaults to ~/.guardian/guardian.toml).
    #[arg(long, env = "GUARDIAN_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guardian=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = GuardianConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        GuardianConfig::default()
    });
    config.validate()?;

    // The classifier is loaded once; a bot that cannot moderate must not start.
    let moderation = if config.moderation.enabled {
        Some(build_moderation(&config).await?)
    } else {
        warn!("media moderation disabled by config");
        None
    };

    let backend = Arc::new(OllamaBackend::new(&config.ollama));
    if !backend.is_available().await {
        warn!(url = %backend.base_url(), "Ollama not reachable yet, !ia will fail until it is");
    }

    let conversations = ConversationService::new(
        Arc::new(ConversationStore::new()),
        OverflowPolicy::from_config(&config.conversation),
        backend,
        config.ollama.model.clone(),
        SamplingOptions::from_config(&config.ollama),
    );

    let state = Arc::new(app::AppState::new(config, moderation, conversations));

    // spawn Telegram adapter if configured
    if let Some(ref telegram_cfg) = state.config.channels.telegram {
        let adapter = guardian_telegram::TelegramAdapter::new(telegram_cfg, Arc::clone(&state));
        tokio::spawn(async move {
            if let Err(e) = adapter.run().await {
                error!(error = %e, "Telegram adapter stopped");
            }
        });
        info!("Telegram bot started");
    } else {
        warn!("no messaging channel configured");
    }

    if state.config.gateway.enabled {
        let addr: SocketAddr = format!("{}:{}", state.config.gateway.bind, state.config.gateway.port)
            .parse()
            .context("invalid gateway bind address")?;
        let router = app::build_router(Arc::clone(&state));

        info!("Guardian gateway listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    info!("Guardian stopped");
    Ok(())
}

async fn build_moderation(config: &GuardianConfig) -> anyhow::Result<ModerationPipeline> {
    info!(url = %config.classifier.base_url, "loading image classifier");
    let classifier = RemoteClassifier::load(&config.classifier)
        .await
        .map_err(|e| GuardianError::ClassifierStartup(e.to_string()))?;
    info!(
        model = classifier.name(),
        labels = ?classifier.labels(),
        "image classifier ready"
    );

    let policy = ModerationPolicy::from_config(&config.moderation)?;
    let pipeline = ModerationPipeline::new(Arc::new(classifier), policy)?;
    Ok(pipeline)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
