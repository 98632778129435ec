use std::sync::Arc;

use anyhow::Context as _;

use pet_assist::channels::{Channel, TelegramChannel};
use pet_assist::config::{BotConfig, LlmConfig, TelegramConfig};
use pet_assist::error::{ConfigError, Result};
use pet_assist::llm::create_provider;
use pet_assist::{DialogueController, serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let (channel, controller) = bootstrap().await.context("Failed to start Pet Assist")?;
    serve(channel, controller).await?;
    Ok(())
}

/// Read configuration, connect to the model service and check the bot token.
async fn bootstrap() -> Result<(Arc<dyn Channel>, Arc<DialogueController>)> {
    let llm_config = LlmConfig::from_env()?;
    let telegram_config = TelegramConfig::from_env()
        .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".to_string()))?;
    let config = BotConfig::from_env();
    config.validate(&llm_config)?;

    eprintln!("🐾 Pet Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   History window: {}", config.dialogue.history_window);
    eprintln!(
        "   Threads: {}",
        if config.router.persistent_threads {
            "persistent"
        } else {
            "stateless"
        }
    );

    let llm = create_provider(&llm_config)?;
    let controller = Arc::new(DialogueController::new(llm, config));

    let channel: Arc<dyn Channel> = Arc::new(TelegramChannel::new(&telegram_config));
    channel.health_check().await?;

    Ok((channel, controller))
}
