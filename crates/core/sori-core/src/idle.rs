//! Automatic session reclamation
//!
//! Two triggers end an unattended session: a periodic timer comparing the
//! time since the last queued or played utterance against the configured
//! threshold, and an occupancy signal (fed by the Discord adapter) that fires
//! immediately when the bot is alone in the channel. The occupancy trigger
//! does not wait for the timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::tts::TtsService;

/// How often the idle timer wakes up.
const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic idle watchdog over the service's voice session.
pub struct IdleMonitor;

impl IdleMonitor {
    /// Spawn the watchdog task. Returns `None` when auto-leave is disabled
    /// by configuration (threshold of zero or less).
    pub fn spawn(service: Arc<TtsService>) -> Option<JoinHandle<()>> {
        let Some(threshold) = service.idle_threshold() else {
            info!("auto-leave disabled");
            return None;
        };

        info!(
            timeout_secs = threshold.as_secs(),
            "auto-leave timer started"
        );

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CHECK_INTERVAL);
            // the first tick fires immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                service.check_idle().await;
            }
        }))
    }
}
