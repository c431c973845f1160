//! Sori bot entry point

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sori_core::{load_env, BotConfig};

fn init_logging() {
    let filter = EnvFilter::try_from_env("SORI_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = load_env() {
        error!(error = %e, "failed to load environment");
        std::process::exit(1);
    }

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    if config.tts_channel_ids.is_empty() {
        info!("no TTS voice channels configured; the bot will stay out of voice");
    } else {
        info!(
            channels = ?config.tts_channel_ids,
            language = %config.language,
            idle_timeout_minutes = config.idle_timeout_minutes,
            "tts configured"
        );
    }

    if let Err(e) = sori_adaptor_discord::run(config).await {
        error!(error = %e, "bot terminated");
        std::process::exit(1);
    }

    info!("bye");
}
