//! Discord event handler
//!
//! Listens for chat in the configured voice channels (and their threads),
//! feeds it to the TTS service, registers and serves the `/voice` profile
//! command, and turns voice-state updates into occupancy signals.

use std::sync::Arc;

use serenity::async_trait;
use serenity::builder::{
    CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage,
};
use serenity::model::application::{
    Command, CommandOptionType, Interaction, ResolvedOption, ResolvedValue,
};
use serenity::model::channel::{Channel, ChannelType, Message};
use serenity::model::gateway::Ready;
use serenity::model::voice::VoiceState;
use serenity::prelude::{Context, EventHandler};
use tracing::{debug, info, warn};

use sori_core::{filter_message_for_tts, ReplyHandle, TtsService, Utterance, VoiceProfile};

use crate::reply::DiscordReply;

pub struct Handler {
    service: Arc<TtsService>,
    catalog: Vec<VoiceProfile>,
}

impl Handler {
    pub fn new(service: Arc<TtsService>, catalog: Vec<VoiceProfile>) -> Self {
        Self { service, catalog }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, data_about_bot: Ready) {
        info!(user = %data_about_bot.user.name, "discord login complete");

        let mut option = CreateCommandOption::new(
            CommandOptionType::String,
            "profile",
            "변경할 목소리를 선택하세요",
        )
        .required(true);
        for profile in &self.catalog {
            option = option.add_string_choice(&profile.display_name, profile.id.to_string());
        }
        let command = CreateCommand::new("voice")
            .description("TTS 목소리를 변경합니다.")
            .add_option(option);
        if let Err(e) = Command::create_global_command(&ctx.http, command).await {
            warn!(error = %format!("{:?}", e), "failed to register /voice command");
        }

        if self.service.is_enabled() {
            info!("tts service enabled; chat in the configured voice channels is read aloud");
        } else {
            info!("tts service disabled (set TTS_VOICE_CHANNEL_IDS to enable)");
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        if !self.service.is_enabled() {
            return;
        }

        let Some(voice_channel_id) = resolve_voice_channel(&ctx, &msg).await else {
            return;
        };
        if !self.service.is_valid_channel(voice_channel_id) {
            return;
        }

        let text = filter_message_for_tts(&msg.content);

        // join on demand: the first message in a voice channel's chat brings
        // the bot in, and join errors go back to its author
        if !self.service.is_active() {
            if let Err(err) = self.service.start(guild_id.get(), voice_channel_id).await {
                warn!(error = %err, channel_id = voice_channel_id, "could not start tts session");
                let _ = msg.reply(&ctx.http, format!("⚠️ {}", err)).await;
                return;
            }
        }

        let reply = Arc::new(DiscordReply::new(Arc::clone(&ctx.http), msg.channel_id));
        let utterance = Utterance::new(
            msg.author.id.get(),
            guild_id.get(),
            voice_channel_id,
            text,
            reply as Arc<dyn ReplyHandle>,
        );
        if let Err(err) = Arc::clone(&self.service).enqueue(utterance).await {
            debug!(error = %err, "utterance rejected");
            let _ = msg.reply(&ctx.http, format!("⚠️ {}", err)).await;
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        if command.data.name != "voice" {
            return;
        }

        let choice = command.data.options().first().and_then(|opt| match opt {
            ResolvedOption {
                value: ResolvedValue::String(value),
                ..
            } => value.parse::<usize>().ok(),
            _ => None,
        });

        let content = match choice {
            Some(index) => match self.service.set_profile(command.user.id.get(), index).await {
                Ok(profile_name) => {
                    info!(user_id = command.user.id.get(), profile = %profile_name, "voice profile changed");
                    format!("✅ 목소리가 **{}**(으)로 변경되었습니다.", profile_name)
                }
                Err(err) => format!("❌ {}", err),
            },
            None => "❌ 올바른 목소리를 선택하세요.".to_string(),
        };

        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(true),
        );
        if let Err(e) = command.create_response(&ctx.http, response).await {
            warn!(error = %format!("{:?}", e), "failed to answer /voice command");
        }
    }

    /// Feed occupancy changes in the session's channel to the service so it
    /// can leave as soon as it is alone.
    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some((session_guild, session_channel)) = self.service.current_channel().await else {
            return;
        };
        if guild_id.get() != session_guild {
            return;
        }

        let others = {
            let Some(guild) = ctx.cache.guild(guild_id) else {
                return;
            };
            let own_id = ctx.cache.current_user().id;
            guild
                .voice_states
                .values()
                .filter(|vs| vs.channel_id.map(|c| c.get()) == Some(session_channel))
                .filter(|vs| vs.user_id != own_id)
                .count()
        };

        debug!(channel_id = session_channel, others, "voice occupancy changed");
        self.service.notify_occupancy(session_channel, others).await;
    }
}

/// Map a message to the voice channel it belongs to: either the voice
/// channel's own chat, or a thread hanging off one.
async fn resolve_voice_channel(ctx: &Context, msg: &Message) -> Option<u64> {
    let channel = msg.channel(ctx).await.ok()?;
    let Channel::Guild(channel) = channel else {
        return None;
    };
    match channel.kind {
        ChannelType::Voice => Some(channel.id.get()),
        ChannelType::PublicThread | ChannelType::PrivateThread => {
            let parent_id = channel.parent_id?;
            let parent = ctx.http.get_channel(parent_id).await.ok()?;
            match parent {
                Channel::Guild(parent) if parent.kind == ChannelType::Voice => {
                    Some(parent.id.get())
                }
                _ => None,
            }
        }
        _ => None,
    }
}
