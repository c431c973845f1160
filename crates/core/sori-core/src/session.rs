//! Voice session lifecycle
//!
//! The process holds at most one live voice connection. [`SessionManager`]
//! owns that slot: it joins on demand, reuses a healthy connection, watches
//! for transient drops, and guarantees the underlying handle is released
//! exactly once on teardown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::audio::AudioSink;
use crate::error::{Result, SoriError};

/// Connection state reported by a [`VoiceLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Signalling,
    Ready,
    Disconnected,
    Destroyed,
}

impl LinkState {
    /// States in which the link is usable or actively becoming usable.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            LinkState::Connecting | LinkState::Signalling | LinkState::Ready
        )
    }
}

/// Opens voice connections. Implemented by the Discord adapter; the core only
/// sees the resulting [`VoiceLink`].
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Resolve `channel_id` and open a connection to it. Fails with a
    /// connection error when the channel is not voice-capable.
    async fn connect(&self, guild_id: u64, channel_id: u64) -> Result<Arc<dyn VoiceLink>>;
}

/// A live (or dying) voice connection.
#[async_trait]
pub trait VoiceLink: Send + Sync {
    /// Watch the connection state. The receiver starts at the current state.
    fn state(&self) -> watch::Receiver<LinkState>;

    /// The audio output of this connection.
    fn sink(&self) -> Arc<dyn AudioSink>;

    /// Close the connection. Must be idempotent: disconnecting an already
    /// destroyed link is a no-op, never an error.
    async fn disconnect(&self);
}

/// Deadlines for joining and for riding out a transient disconnect.
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    /// How long a join may take to reach `Ready`
    pub join_deadline: Duration,
    /// Grace window for a dropped connection to start recovering
    pub reconnect_window: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            join_deadline: Duration::from_secs(15),
            reconnect_window: Duration::from_secs(5),
        }
    }
}

struct ActiveSession {
    guild_id: u64,
    channel_id: u64,
    link: Arc<dyn VoiceLink>,
    last_activity: Instant,
}

/// Owner of the single live voice session.
pub struct SessionManager {
    gateway: Arc<dyn VoiceGateway>,
    timing: SessionTiming,
    current: Arc<RwLock<Option<ActiveSession>>>,
    // serializes joins so racing ensure() calls cannot open two connections
    join_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn VoiceGateway>, timing: SessionTiming) -> Self {
        Self {
            gateway,
            timing,
            current: Arc::new(RwLock::new(None)),
            join_lock: Mutex::new(()),
        }
    }

    pub fn gateway(&self) -> Arc<dyn VoiceGateway> {
        Arc::clone(&self.gateway)
    }

    /// Ensure a session exists for `(guild_id, channel_id)` and return its link.
    ///
    /// A session bound to a different channel is never replaced implicitly;
    /// the caller gets a connection error and the existing session is left
    /// untouched. A healthy session for the same channel is reused as-is.
    pub async fn ensure(&self, guild_id: u64, channel_id: u64) -> Result<Arc<dyn VoiceLink>> {
        let _guard = self.join_lock.lock().await;

        {
            let mut current = self.current.write().await;
            if let Some(session) = current.as_mut() {
                if session.channel_id != channel_id {
                    return Err(SoriError::connection(format!(
                        "already connected to another voice channel ({})",
                        session.channel_id
                    )));
                }
                let state = *session.link.state().borrow();
                if state.is_live() {
                    session.last_activity = Instant::now();
                    return Ok(Arc::clone(&session.link));
                }
                debug!(channel_id, "existing voice link is dead, rejoining");
                *current = None;
            }
        }

        let link = self.gateway.connect(guild_id, channel_id).await?;
        if let Err(err) = wait_until_ready(link.as_ref(), self.timing.join_deadline).await {
            link.disconnect().await;
            return Err(err);
        }

        {
            let mut current = self.current.write().await;
            *current = Some(ActiveSession {
                guild_id,
                channel_id,
                link: Arc::clone(&link),
                last_activity: Instant::now(),
            });
        }
        self.spawn_supervisor(channel_id, Arc::clone(&link));

        info!(guild_id, channel_id, "joined voice channel");
        Ok(link)
    }

    /// Watch the link for trouble: a transient disconnect gets a bounded
    /// window to start recovering, after which the session is abandoned.
    fn spawn_supervisor(&self, channel_id: u64, link: Arc<dyn VoiceLink>) {
        let current = Arc::clone(&self.current);
        let window = self.timing.reconnect_window;

        tokio::spawn(async move {
            let mut rx = link.state();
            loop {
                let state = *rx.borrow_and_update();
                match state {
                    // destroyed elsewhere (teardown); nothing left to clean up
                    LinkState::Destroyed => return,
                    LinkState::Disconnected => {
                        warn!(channel_id, "voice connection lost, waiting for recovery");
                        if !wait_for_recovery(&mut rx, window).await {
                            warn!(channel_id, "voice connection did not recover, abandoning session");
                            break;
                        }
                        info!(channel_id, "voice connection recovered");
                        continue;
                    }
                    _ => {}
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }

            // only clear the slot if it still holds this very link
            {
                let mut guard = current.write().await;
                if let Some(session) = guard.as_ref() {
                    if Arc::ptr_eq(&session.link, &link) {
                        *guard = None;
                    }
                }
            }
            link.disconnect().await;
        });
    }

    /// Destroy the current session, if any. Safe to call repeatedly.
    pub async fn teardown(&self) {
        let taken = { self.current.write().await.take() };
        if let Some(session) = taken {
            info!(channel_id = session.channel_id, "leaving voice channel");
            session.link.sink().halt().await;
            session.link.disconnect().await;
        }
    }

    /// Record activity on the session, postponing the idle timeout.
    pub async fn touch(&self) {
        if let Some(session) = self.current.write().await.as_mut() {
            session.last_activity = Instant::now();
        }
    }

    /// `(guild_id, channel_id)` of the live session, if any.
    pub async fn current_channel(&self) -> Option<(u64, u64)> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| (s.guild_id, s.channel_id))
    }

    /// Time since the last recorded activity, if a session exists.
    pub async fn idle_for(&self) -> Option<Duration> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| s.last_activity.elapsed())
    }
}

async fn wait_until_ready(link: &dyn VoiceLink, deadline: Duration) -> Result<()> {
    let mut rx = link.state();
    let wait = async {
        loop {
            let state = *rx.borrow_and_update();
            match state {
                LinkState::Ready => return Ok(()),
                LinkState::Destroyed => {
                    return Err(SoriError::connection(
                        "voice connection was destroyed during join",
                    ))
                }
                _ => {}
            }
            if rx.changed().await.is_err() {
                return Err(SoriError::connection("voice connection dropped during join"));
            }
        }
    };

    match tokio::time::timeout(deadline, wait).await {
        Ok(result) => result,
        Err(_) => Err(SoriError::connection(
            "timed out waiting for voice connection",
        )),
    }
}

/// Wait up to `window` for the link to leave `Disconnected` for any live
/// state. Returns false when the window closes or the link is destroyed.
async fn wait_for_recovery(rx: &mut watch::Receiver<LinkState>, window: Duration) -> bool {
    let wait = async {
        loop {
            if rx.changed().await.is_err() {
                return false;
            }
            let state = *rx.borrow_and_update();
            if state.is_live() {
                return true;
            }
            if state == LinkState::Destroyed {
                return false;
            }
        }
    };

    tokio::time::timeout(window, wait).await.unwrap_or(false)
}
