//! Audio data types and the collaborator seams around them
//!
//! The core never talks to Discord or to an HTTP endpoint directly; it sees a
//! synthesizer that produces byte streams and a sink that plays prepared
//! audio and reports when the track ends.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

use crate::error::Result;

/// A fallible stream of audio bytes, as fetched from the synthesis provider
/// or produced by the transcoder.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Wrap a single chunk of bytes as a [`ByteStream`].
pub fn stream_from_bytes(data: Bytes) -> ByteStream {
    Box::pin(futures_util::stream::once(async move { Ok(data) }))
}

/// Container hint attached to prepared audio so the sink knows how to probe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHint {
    /// Whatever the synthesis provider returned; let the decoder sniff it
    Arbitrary,
    /// Opus in an Ogg container, as produced by the transcoder
    OggOpus,
}

/// Fully buffered audio ready to be handed to the sink.
#[derive(Debug, Clone)]
pub struct PlayableAudio {
    pub hint: StreamHint,
    pub data: Bytes,
}

/// Terminal playback signal reported by the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEnd {
    Finished,
    Errored(String),
}

/// The audio output endpoint of the live voice session.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Start playing `audio`; the returned channel yields exactly one
    /// [`PlaybackEnd`] when the track finishes or fails.
    async fn play(&self, audio: PlayableAudio) -> Result<mpsc::Receiver<PlaybackEnd>>;

    /// Stop whatever is currently playing.
    async fn halt(&self);
}

/// Text-to-speech provider: one network round trip per utterance.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` (at most 200 characters) in `language`, returning
    /// the fetched audio as a byte stream.
    async fn synthesize(&self, text: &str, language: &str) -> Result<ByteStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_stream_from_bytes_yields_once() {
        let mut stream = stream_from_bytes(Bytes::from_static(b"abc"));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"abc"));
        assert!(stream.next().await.is_none());
    }
}
