//! Error feedback to the channel an utterance came from

use std::sync::Arc;

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::id::ChannelId;
use tracing::debug;

use sori_core::ReplyHandle;

/// Posts playback errors back into the originating text channel.
pub struct DiscordReply {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl DiscordReply {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl ReplyHandle for DiscordReply {
    async fn reply_error(&self, text: &str) {
        if let Err(e) = self.channel_id.say(&self.http, text).await {
            debug!(error = %format!("{:?}", e), "failed to deliver error reply");
        }
    }
}
