//! Configuration management and environment variable loading

use std::env;
use std::time::Duration;

use crate::error::{Result, SoriError};
use crate::profiles::{self, VoiceProfile};

/// Load environment variables from a .env file.
///
/// Missing files are fine; the process environment is used as-is.
pub fn load_env() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::info!("loaded environment from {}", path.display());
            Ok(())
        }
        Err(dotenvy::Error::Io(_)) => {
            tracing::debug!("no .env file found, using system environment only");
            Ok(())
        }
        Err(e) => Err(SoriError::config(format!("failed to load .env file: {}", e))),
    }
}

/// Get required environment variable
pub fn get_required_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| {
        SoriError::config(format!(
            "required environment variable '{}' is not set",
            key
        ))
    })
}

/// Get optional environment variable with default
pub fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get environment variable as integer, falling back on parse failure
pub fn get_env_int<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Bot configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Discord bot token
    pub token: String,
    /// Voice channels whose chat is read aloud; empty disables the service
    pub tts_channel_ids: Vec<u64>,
    /// Synthesis language code
    pub language: String,
    /// Minutes of inactivity before the bot leaves the channel; 0 disables
    pub idle_timeout_minutes: i64,
    /// Voice profile catalog, fixed for the process lifetime
    pub profiles: Vec<VoiceProfile>,
}

impl BotConfig {
    /// Read the configuration from the environment.
    ///
    /// Recognized variables: `DISCORD_TOKEN` (required),
    /// `TTS_VOICE_CHANNEL_IDS` (comma-separated channel ids), `TTS_LANG`
    /// (default `ko`), `AUTO_LEAVE_TIMEOUT_MINUTES` (default 5, 0 disables)
    /// and `VOICE_PROFILES_JSON` (optional catalog override).
    pub fn from_env() -> Result<Self> {
        let token = get_required_env("DISCORD_TOKEN")?;

        let tts_channel_ids = env::var("TTS_VOICE_CHANNEL_IDS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|part| part.trim().parse::<u64>().ok())
            .collect();

        let language = get_env_or("TTS_LANG", "ko");
        let idle_timeout_minutes = get_env_int("AUTO_LEAVE_TIMEOUT_MINUTES", 5);

        let profiles = match env::var("VOICE_PROFILES_JSON") {
            Ok(raw) => profiles::parse_catalog(&raw)?,
            Err(_) => profiles::default_catalog(),
        };
        if profiles.is_empty() {
            return Err(SoriError::config("voice profile catalog must not be empty"));
        }

        Ok(Self {
            token,
            tts_channel_ids,
            language,
            idle_timeout_minutes,
            profiles,
        })
    }

    /// Idle threshold as a duration, or `None` when auto-leave is disabled.
    pub fn idle_threshold(&self) -> Option<Duration> {
        if self.idle_timeout_minutes > 0 {
            Some(Duration::from_secs(self.idle_timeout_minutes as u64 * 60))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::default_catalog;

    fn test_config() -> BotConfig {
        BotConfig {
            token: "token".to_string(),
            tts_channel_ids: vec![111, 222],
            language: "ko".to_string(),
            idle_timeout_minutes: 5,
            profiles: default_catalog(),
        }
    }

    #[test]
    fn test_idle_threshold() {
        let mut config = test_config();
        assert_eq!(config.idle_threshold(), Some(Duration::from_secs(300)));

        config.idle_timeout_minutes = 0;
        assert_eq!(config.idle_threshold(), None);

        config.idle_timeout_minutes = -1;
        assert_eq!(config.idle_threshold(), None);
    }

    #[test]
    fn test_get_env_int_falls_back() {
        // deliberately unset key
        assert_eq!(get_env_int("SORI_TEST_UNSET_INT", 5i64), 5);
    }

    #[test]
    fn test_channel_id_parsing() {
        let ids: Vec<u64> = "123, 456,,abc, 789"
            .split(',')
            .filter_map(|part| part.trim().parse::<u64>().ok())
            .collect();
        assert_eq!(ids, vec![123, 456, 789]);
    }
}
