//! Discord adapter for the Sori TTS bot
//!
//! Wires the serenity gateway and songbird voice driver to the core service:
//! chat in configured voice channels is queued for playback, `/voice` sets a
//! speaker's profile, and voice-state changes drive the auto-leave triggers.

use std::sync::Arc;

use serenity::http::Http;
use serenity::model::gateway::GatewayIntents;
use serenity::prelude::Client;
use songbird::serenity::SerenityInit;
use songbird::Songbird;
use tracing::{error, info};

use sori_core::{BotConfig, IdleMonitor, Result, SoriError, SpeechSynthesizer, TtsService};
use sori_provider_gtts::GoogleTranslateTts;

pub mod gateway;
pub mod handler;
pub mod reply;

pub use gateway::SongbirdGateway;
pub use handler::Handler;
pub use reply::DiscordReply;

/// Run the bot until the process is told to stop.
///
/// Builds the full stack (gateway, synthesizer, service, idle monitor,
/// serenity client) and blocks until ctrl-c or a fatal client error. The
/// voice session is torn down before this returns.
pub async fn run(config: BotConfig) -> Result<()> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let http = Arc::new(Http::new(&config.token));
    let gateway = Arc::new(SongbirdGateway::new(Arc::clone(&songbird), http));
    let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(GoogleTranslateTts::new());

    let catalog = config.profiles.clone();
    let service = Arc::new(TtsService::new(config.clone(), synthesizer, gateway));
    let idle_task = IdleMonitor::spawn(Arc::clone(&service));

    let handler = Handler::new(Arc::clone(&service), catalog);
    let mut client = Client::builder(&config.token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await
        .map_err(|e| SoriError::connection(format!("failed to build discord client: {}", e)))?;

    let shard_manager = client.shard_manager.clone();

    tokio::select! {
        result = client.start() => {
            if let Err(e) = result {
                error!(error = %format!("{:?}", e), "discord client stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    // leave the voice channel and stop the timers before exiting
    if let Some(task) = idle_task {
        task.abort();
    }
    service.stop().await;
    shard_manager.shutdown_all().await;

    Ok(())
}
