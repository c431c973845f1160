//! TTS playback service
//!
//! Owns the utterance queue and drains it one item at a time: synthesize,
//! make sure the voice session is up, apply the speaker's voice profile,
//! play, wait for the track to end, repeat. A failing item is reported back
//! to its author and never blocks the items behind it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::audio::{PlaybackEnd, SpeechSynthesizer};
use crate::config::BotConfig;
use crate::error::{Result, SoriError};
use crate::pipeline::AudioPipeline;
use crate::profiles::ProfileSelector;
use crate::session::{SessionManager, SessionTiming, VoiceGateway};

/// Hard cap on synthesized text length, in characters.
pub const MAX_TTS_CHARS: usize = 200;

/// Where errors for a queued utterance are reported (best-effort).
#[async_trait]
pub trait ReplyHandle: Send + Sync {
    async fn reply_error(&self, text: &str);
}

/// One queued unit of text to be spoken.
pub struct Utterance {
    pub speaker_id: u64,
    pub guild_id: u64,
    pub channel_id: u64,
    pub text: String,
    pub submitted_at: Instant,
    pub reply: Arc<dyn ReplyHandle>,
}

impl Utterance {
    pub fn new(
        speaker_id: u64,
        guild_id: u64,
        channel_id: u64,
        text: impl Into<String>,
        reply: Arc<dyn ReplyHandle>,
    ) -> Self {
        Self {
            speaker_id,
            guild_id,
            channel_id,
            text: text.into(),
            submitted_at: Instant::now(),
            reply,
        }
    }
}

/// Queue snapshot for status commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueInfo {
    pub queued: usize,
    pub playing: bool,
}

struct QueueState {
    items: VecDeque<Utterance>,
    /// a drain task currently owns the queue
    draining: bool,
    /// an utterance is somewhere in the synthesize→play pipeline
    playing: bool,
}

/// The TTS service: queue, session and profile state behind one instance.
pub struct TtsService {
    config: BotConfig,
    idle_threshold: Option<Duration>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    pipeline: AudioPipeline,
    sessions: SessionManager,
    profiles: RwLock<ProfileSelector>,
    queue: Mutex<QueueState>,
    active: AtomicBool,
    // bumped by stop(); in-flight drains notice and discard their work
    epoch: AtomicU64,
}

impl TtsService {
    pub fn new(
        config: BotConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        gateway: Arc<dyn VoiceGateway>,
    ) -> Self {
        let idle_threshold = config.idle_threshold();
        let profiles = ProfileSelector::new(config.profiles.clone());
        Self {
            idle_threshold,
            synthesizer,
            pipeline: AudioPipeline::new(),
            sessions: SessionManager::new(gateway, SessionTiming::default()),
            profiles: RwLock::new(profiles),
            queue: Mutex::new(QueueState {
                items: VecDeque::new(),
                draining: false,
                playing: false,
            }),
            active: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            config,
        }
    }

    /// Replace the session deadlines (tests shrink these).
    pub fn with_timing(mut self, timing: SessionTiming) -> Self {
        let gateway = self.sessions.gateway();
        self.sessions = SessionManager::new(gateway, timing);
        self
    }

    /// Replace the audio pipeline (tests substitute the transcoder command).
    pub fn with_pipeline(mut self, pipeline: AudioPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Replace the idle threshold (tests shrink it to milliseconds).
    pub fn with_idle_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.idle_threshold = threshold;
        self
    }

    /// Whether any TTS voice channels are configured at all.
    pub fn is_enabled(&self) -> bool {
        !self.config.tts_channel_ids.is_empty()
    }

    /// Whether `channel_id` is one of the configured TTS voice channels.
    pub fn is_valid_channel(&self, channel_id: u64) -> bool {
        self.config.tts_channel_ids.contains(&channel_id)
    }

    /// Whether a session has been requested since the last stop.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn idle_threshold(&self) -> Option<Duration> {
        self.idle_threshold
    }

    /// `(guild_id, channel_id)` of the live voice session, if any.
    pub async fn current_channel(&self) -> Option<(u64, u64)> {
        self.sessions.current_channel().await
    }

    pub fn queue_info(&self) -> QueueInfo {
        let queue = self.queue.lock().unwrap();
        QueueInfo {
            queued: queue.items.len(),
            playing: queue.playing,
        }
    }

    /// Activate the service and join `channel_id`.
    ///
    /// Errors here go straight back to whoever asked for the session.
    pub async fn start(&self, guild_id: u64, channel_id: u64) -> Result<()> {
        if !self.is_enabled() {
            return Err(SoriError::config("no tts voice channels are configured"));
        }
        if !self.is_valid_channel(channel_id) {
            return Err(SoriError::validation(
                "channel is not a configured tts voice channel",
            ));
        }
        self.sessions.ensure(guild_id, channel_id).await?;
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Deactivate: drop everything queued, revoke any in-flight drain and
    /// leave the voice channel. Later enqueues are rejected until the next
    /// start.
    pub async fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        {
            let mut queue = self.queue.lock().unwrap();
            queue.items.clear();
            queue.draining = false;
            queue.playing = false;
        }
        self.sessions.teardown().await;
        info!("tts service stopped");
    }

    /// Queue an utterance for playback.
    ///
    /// Text is trimmed and truncated to [`MAX_TTS_CHARS`] characters;
    /// whitespace-only messages are dropped silently. Starts a drain task
    /// unless one is already running.
    pub async fn enqueue(self: Arc<Self>, utterance: Utterance) -> Result<()> {
        if !self.is_active() {
            return Err(SoriError::validation("tts service is not active"));
        }

        let text: String = utterance.text.trim().chars().take(MAX_TTS_CHARS).collect();
        if text.is_empty() {
            return Ok(());
        }
        let item = Utterance { text, ..utterance };

        self.sessions.touch().await;

        let kick = {
            let mut queue = self.queue.lock().unwrap();
            queue.items.push_back(item);
            if queue.draining {
                false
            } else {
                queue.draining = true;
                true
            }
        };

        if kick {
            let service = Arc::clone(&self);
            let epoch = self.epoch.load(Ordering::SeqCst);
            tokio::spawn(async move { service.drain(epoch).await });
        }
        Ok(())
    }

    /// Pin `speaker_id` to a profile, returning its display name.
    pub async fn set_profile(&self, speaker_id: u64, index: usize) -> Result<String> {
        let mut profiles = self.profiles.write().await;
        profiles.set_override(speaker_id, index)?;
        Ok(profiles.catalog()[index].display_name.clone())
    }

    /// Periodic idle check; tears the session down once the configured
    /// threshold is reached. A torn-down session makes this a no-op.
    pub async fn check_idle(&self) {
        let Some(threshold) = self.idle_threshold else {
            return;
        };
        if let Some(idle) = self.sessions.idle_for().await {
            if idle >= threshold {
                info!(
                    idle_secs = idle.as_secs(),
                    "no activity on voice session, leaving channel"
                );
                self.sessions.teardown().await;
            }
        }
    }

    /// Occupancy trigger: when everyone but the bot has left the session's
    /// channel, leave immediately.
    pub async fn notify_occupancy(&self, channel_id: u64, others: usize) {
        let Some((_, current)) = self.sessions.current_channel().await else {
            return;
        };
        if current == channel_id && others == 0 {
            info!(channel_id, "alone in voice channel, leaving");
            self.sessions.teardown().await;
        }
    }

    fn stale(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != epoch
    }

    /// Drain the queue until it is empty. There is at most one of these
    /// tasks; enqueue only spawns a new one when `draining` is clear.
    async fn drain(self: Arc<Self>, epoch: u64) {
        loop {
            if self.stale(epoch) {
                return;
            }
            if !self.is_active() {
                let mut queue = self.queue.lock().unwrap();
                queue.draining = false;
                queue.playing = false;
                return;
            }
            let item = {
                let mut queue = self.queue.lock().unwrap();
                match queue.items.pop_front() {
                    Some(item) => {
                        queue.playing = true;
                        item
                    }
                    None => {
                        queue.draining = false;
                        queue.playing = false;
                        return;
                    }
                }
            };

            let result = self.play_one(&item, epoch).await;

            if self.stale(epoch) {
                // stop() already reset the queue flags; they are not ours
                // to touch anymore
                return;
            }
            {
                let mut queue = self.queue.lock().unwrap();
                queue.playing = false;
            }

            if let Err(err) = result {
                warn!(
                    error = %err,
                    speaker_id = item.speaker_id,
                    "utterance failed, continuing with next item"
                );
                item.reply.reply_error(&format!("⚠️ {}", err)).await;
            }
        }
    }

    /// Play a single utterance end-to-end. Bails out quietly whenever the
    /// service was stopped underneath it.
    async fn play_one(&self, item: &Utterance, epoch: u64) -> Result<()> {
        debug!(
            speaker_id = item.speaker_id,
            queued_ms = item.submitted_at.elapsed().as_millis() as u64,
            "draining utterance"
        );

        let source = self
            .synthesizer
            .synthesize(&item.text, &self.config.language)
            .await?;
        if self.stale(epoch) {
            return Ok(());
        }

        let link = self.sessions.ensure(item.guild_id, item.channel_id).await?;
        if self.stale(epoch) {
            return Ok(());
        }

        let profile = {
            let profiles = self.profiles.read().await;
            profiles.resolve(Some(item.speaker_id)).clone()
        };

        let audio = self.pipeline.prepare(source, &profile)?.collect().await?;
        if self.stale(epoch) {
            return Ok(());
        }

        let mut track_end = link.sink().play(audio).await?;
        info!(channel_id = item.channel_id, text = %item.text, "playing utterance");
        self.sessions.touch().await;

        match track_end.recv().await {
            Some(PlaybackEnd::Errored(reason)) => {
                Err(SoriError::other(format!("audio track failed: {}", reason)))
            }
            // a closed channel means the sink went away (e.g. teardown);
            // either way this track is over
            Some(PlaybackEnd::Finished) | None => Ok(()),
        }
    }
}
