//! songbird-backed implementations of the core voice traits
//!
//! The core deals in `VoiceGateway`/`VoiceLink`/`AudioSink`; this module maps
//! those onto a songbird `Call`: joins, driver events, track playback and
//! the track-end signal the drain loop waits on.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::channel::Channel;
use serenity::model::channel::ChannelType;
use serenity::model::id::{ChannelId, GuildId};
use songbird::input::Input;
use songbird::tracks::PlayMode;
use songbird::{
    Call, CoreEvent, Event, EventContext, EventHandler as SongbirdEventHandler, Songbird,
    TrackEvent,
};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};

use sori_core::{
    AudioSink, LinkState, PlayableAudio, PlaybackEnd, Result, SoriError, VoiceGateway, VoiceLink,
};

/// Opens voice connections through songbird.
pub struct SongbirdGateway {
    songbird: Arc<Songbird>,
    http: Arc<Http>,
}

impl SongbirdGateway {
    pub fn new(songbird: Arc<Songbird>, http: Arc<Http>) -> Self {
        Self { songbird, http }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn connect(&self, guild_id: u64, channel_id: u64) -> Result<Arc<dyn VoiceLink>> {
        let channel = self
            .http
            .get_channel(ChannelId::new(channel_id))
            .await
            .map_err(|e| {
                SoriError::connection(format!("failed to resolve channel {}: {}", channel_id, e))
            })?;
        let voice_capable = matches!(&channel, Channel::Guild(ch) if ch.kind == ChannelType::Voice);
        if !voice_capable {
            return Err(SoriError::connection("not a valid voice channel"));
        }

        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);

        let call = self
            .songbird
            .join(GuildId::new(guild_id), ChannelId::new(channel_id))
            .await
            .map_err(|e| SoriError::connection(format!("failed to join voice channel: {}", e)))?;

        {
            let mut handle = call.lock().await;
            // the bot only speaks; never receive anyone's audio
            if let Err(e) = handle.deafen(true).await {
                debug!(error = %e, "could not self-deafen");
            }
            let relay = DriverStateRelay {
                tx: state_tx.clone(),
            };
            handle.add_global_event(Event::Core(CoreEvent::DriverConnect), relay.clone());
            handle.add_global_event(Event::Core(CoreEvent::DriverReconnect), relay.clone());
            handle.add_global_event(Event::Core(CoreEvent::DriverDisconnect), relay);
        }

        // join() resolves once the driver is connected
        let _ = state_tx.send(LinkState::Ready);

        Ok(Arc::new(SongbirdLink {
            guild_id,
            songbird: Arc::clone(&self.songbird),
            call,
            state_tx,
            state_rx,
        }))
    }
}

/// One live songbird connection.
pub struct SongbirdLink {
    guild_id: u64,
    songbird: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    state_tx: watch::Sender<LinkState>,
    state_rx: watch::Receiver<LinkState>,
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    fn state(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    fn sink(&self) -> Arc<dyn AudioSink> {
        Arc::new(SongbirdSink {
            call: Arc::clone(&self.call),
        })
    }

    async fn disconnect(&self) {
        let _ = self.state_tx.send(LinkState::Destroyed);
        if let Err(e) = self.songbird.remove(GuildId::new(self.guild_id)).await {
            // already removed; double-destroy is fine
            debug!(guild_id = self.guild_id, error = %e, "voice connection already removed");
        }
    }
}

/// Maps songbird driver events onto the core's connection states.
#[derive(Clone)]
struct DriverStateRelay {
    tx: watch::Sender<LinkState>,
}

#[async_trait]
impl SongbirdEventHandler for DriverStateRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::DriverConnect(_) | EventContext::DriverReconnect(_) => {
                let _ = self.tx.send(LinkState::Ready);
            }
            EventContext::DriverDisconnect(_) => {
                let _ = self.tx.send(LinkState::Disconnected);
            }
            _ => {}
        }
        None
    }
}

/// Plays prepared audio into a `Call` and reports track completion.
pub struct SongbirdSink {
    call: Arc<Mutex<Call>>,
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn play(&self, audio: PlayableAudio) -> Result<mpsc::Receiver<PlaybackEnd>> {
        let bytes: &'static [u8] = Box::leak(audio.data.to_vec().into_boxed_slice());
        let input: Input = bytes.into();

        let (tx, rx) = mpsc::channel(1);
        let mut call = self.call.lock().await;
        let handle = call.play_input(input);
        handle
            .add_event(Event::Track(TrackEvent::End), TrackEndRelay { tx: tx.clone() })
            .map_err(|e| SoriError::other(format!("failed to watch track end: {:?}", e)))?;
        handle
            .add_event(Event::Track(TrackEvent::Error), TrackEndRelay { tx })
            .map_err(|e| SoriError::other(format!("failed to watch track error: {:?}", e)))?;
        Ok(rx)
    }

    async fn halt(&self) {
        self.call.lock().await.stop();
    }
}

/// Forwards a track's terminal event to the drain loop.
struct TrackEndRelay {
    tx: mpsc::Sender<PlaybackEnd>,
}

#[async_trait]
impl SongbirdEventHandler for TrackEndRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let end = match ctx {
            EventContext::Track(tracks) => match tracks.first() {
                Some((state, _)) if matches!(state.playing, PlayMode::Errored(_)) => {
                    warn!(state = ?state.playing, "voice track errored");
                    PlaybackEnd::Errored(format!("{:?}", state.playing))
                }
                _ => PlaybackEnd::Finished,
            },
            _ => PlaybackEnd::Finished,
        };
        let _ = self.tx.send(end).await;
        None
    }
}
