//! Sori core
//!
//! Everything the TTS bot does that is not Discord-specific lives here: the
//! playback queue and its drain loop, the voice session lifecycle, the
//! ffmpeg-backed audio pipeline, voice profile assignment, idle reclamation,
//! configuration and the error taxonomy. Discord, HTTP synthesis and the
//! audio sink are reached through traits so the whole crate runs against
//! in-memory fakes in tests.

pub mod audio;
pub mod config;
pub mod error;
pub mod idle;
pub mod pipeline;
pub mod profiles;
pub mod session;
pub mod textfilter;
pub mod tts;

pub use audio::{
    stream_from_bytes, AudioSink, ByteStream, PlayableAudio, PlaybackEnd, SpeechSynthesizer,
    StreamHint,
};
pub use config::{load_env, BotConfig};
pub use error::{Result, SoriError};
pub use idle::IdleMonitor;
pub use pipeline::{AudioPipeline, PreparedAudio};
pub use profiles::{default_catalog, ProfileSelector, VoiceProfile};
pub use session::{LinkState, SessionManager, SessionTiming, VoiceGateway, VoiceLink};
pub use textfilter::filter_message_for_tts;
pub use tts::{QueueInfo, ReplyHandle, TtsService, Utterance, MAX_TTS_CHARS};
