//! Audio preparation pipeline
//!
//! Turns a fetched audio stream into playable bytes. Profiles without a
//! filter graph pass straight through; everything else is piped through an
//! external ffmpeg process that applies the filter and re-encodes to
//! two-channel 48kHz Opus in Ogg.

use std::process::Stdio;

use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::oneshot;
use tracing::debug;

use crate::audio::{ByteStream, PlayableAudio, StreamHint};
use crate::error::{Result, SoriError};
use crate::profiles::VoiceProfile;

/// Builds playable audio, spawning the transcoder when a profile asks for it.
#[derive(Debug, Clone)]
pub struct AudioPipeline {
    command: String,
}

impl Default for AudioPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPipeline {
    pub fn new() -> Self {
        Self {
            command: "ffmpeg".to_string(),
        }
    }

    /// Use a different transcoder executable (tests substitute one here).
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Prepare `source` for playback under `profile`.
    ///
    /// With no filter graph the stream is passed through untouched. With one,
    /// the transcoder is spawned with `kill_on_drop` so the process and its
    /// pipes are released on every exit path, including early cancellation.
    pub fn prepare(&self, source: ByteStream, profile: &VoiceProfile) -> Result<PreparedAudio> {
        let Some(graph) = profile.filter_graph.as_deref() else {
            return Ok(PreparedAudio::Passthrough { source });
        };

        debug!(profile = %profile.display_name, filter = %graph, "spawning transcoder");

        let mut cmd = Command::new(&self.command);
        cmd.args(transcode_args(graph))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| SoriError::transcode(format!("failed to spawn transcoder: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SoriError::transcode("transcoder stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SoriError::transcode("transcoder stdout unavailable"))?;

        let (input_err_tx, input_err_rx) = oneshot::channel();
        tokio::spawn(async move {
            let mut source = source;
            while let Some(chunk) = source.next().await {
                match chunk {
                    Ok(bytes) => {
                        // write failures mean the child is gone; its exit
                        // status is reported on the output side
                        if stdin.write_all(&bytes).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = input_err_tx.send(err);
                        return;
                    }
                }
            }
            let _ = stdin.shutdown().await;
            // dropping stdin closes the pipe so the child sees EOF
        });

        Ok(PreparedAudio::Transcoded {
            child,
            stdout,
            input_err: input_err_rx,
        })
    }
}

/// Fixed transcoder invocation: filter graph in, 2ch/48kHz Opus-in-Ogg out.
pub fn transcode_args(filter_graph: &str) -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-i",
        "pipe:0",
        "-af",
        filter_graph,
        "-ac",
        "2",
        "-ar",
        "48000",
        "-c:a",
        "libopus",
        "-f",
        "ogg",
        "pipe:1",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// A playable resource that has not been drained yet.
pub enum PreparedAudio {
    Passthrough {
        source: ByteStream,
    },
    Transcoded {
        child: Child,
        stdout: ChildStdout,
        input_err: oneshot::Receiver<SoriError>,
    },
}

impl std::fmt::Debug for PreparedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreparedAudio::Passthrough { .. } => f.debug_struct("Passthrough").finish_non_exhaustive(),
            PreparedAudio::Transcoded { .. } => f.debug_struct("Transcoded").finish_non_exhaustive(),
        }
    }
}

impl PreparedAudio {
    pub fn hint(&self) -> StreamHint {
        match self {
            PreparedAudio::Passthrough { .. } => StreamHint::Arbitrary,
            PreparedAudio::Transcoded { .. } => StreamHint::OggOpus,
        }
    }

    /// Drain the resource into memory, reaping the transcoder if one was
    /// spawned. Input-stream failures, broken pipes and abnormal exits all
    /// surface as transcode errors.
    pub async fn collect(self) -> Result<PlayableAudio> {
        match self {
            PreparedAudio::Passthrough { mut source } => {
                let mut data = Vec::new();
                while let Some(chunk) = source.next().await {
                    data.extend_from_slice(&chunk?);
                }
                Ok(PlayableAudio {
                    hint: StreamHint::Arbitrary,
                    data: data.into(),
                })
            }
            PreparedAudio::Transcoded {
                mut child,
                mut stdout,
                mut input_err,
            } => {
                let mut data = Vec::new();

                let read_result = tokio::select! {
                    result = stdout.read_to_end(&mut data) => Some(result),
                    input = &mut input_err => {
                        match input {
                            Ok(err) => {
                                let _ = child.start_kill();
                                let _ = child.wait().await;
                                return Err(SoriError::transcode(format!(
                                    "audio input failed mid-transcode: {}",
                                    err
                                )));
                            }
                            // input task finished without error; keep reading
                            Err(_) => None,
                        }
                    }
                };
                let read_result = match read_result {
                    Some(result) => result,
                    None => stdout.read_to_end(&mut data).await,
                };

                if let Err(err) = read_result {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Err(SoriError::transcode(format!(
                        "transcoder output failed: {}",
                        err
                    )));
                }

                let status = child
                    .wait()
                    .await
                    .map_err(|e| SoriError::transcode(format!("failed to reap transcoder: {}", e)))?;

                if let Ok(err) = input_err.try_recv() {
                    return Err(SoriError::transcode(format!(
                        "audio input failed mid-transcode: {}",
                        err
                    )));
                }
                if !status.success() {
                    return Err(SoriError::transcode(format!(
                        "transcoder exited with {}",
                        status
                    )));
                }

                Ok(PlayableAudio {
                    hint: StreamHint::OggOpus,
                    data: data.into(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::stream_from_bytes;
    use bytes::Bytes;

    fn plain_profile() -> VoiceProfile {
        VoiceProfile {
            id: 0,
            filter_graph: None,
            display_name: "Plain".to_string(),
        }
    }

    fn filtered_profile() -> VoiceProfile {
        VoiceProfile {
            id: 1,
            filter_graph: Some("asetrate=26400,atempo=0.91".to_string()),
            display_name: "High".to_string(),
        }
    }

    #[test]
    fn test_transcode_args_template() {
        let args = transcode_args("asetrate=26400,atempo=0.91");
        assert_eq!(args[..5], ["-hide_banner", "-loglevel", "error", "-i", "pipe:0"]);
        let af = args.iter().position(|a| a == "-af").unwrap();
        assert_eq!(args[af + 1], "asetrate=26400,atempo=0.91");
        for pair in [["-ac", "2"], ["-ar", "48000"], ["-c:a", "libopus"], ["-f", "ogg"]] {
            let at = args.iter().position(|a| a == pair[0]).unwrap();
            assert_eq!(args[at + 1], pair[1]);
        }
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[tokio::test]
    async fn test_passthrough_keeps_bytes() {
        let pipeline = AudioPipeline::new();
        let prepared = pipeline
            .prepare(stream_from_bytes(Bytes::from_static(b"mp3data")), &plain_profile())
            .unwrap();
        assert_eq!(prepared.hint(), StreamHint::Arbitrary);

        let audio = prepared.collect().await.unwrap();
        assert_eq!(audio.hint, StreamHint::Arbitrary);
        assert_eq!(audio.data, Bytes::from_static(b"mp3data"));
    }

    #[tokio::test]
    async fn test_passthrough_propagates_stream_error() {
        let pipeline = AudioPipeline::new();
        let source: ByteStream = Box::pin(futures_util::stream::once(async {
            Err(SoriError::synthesis("fetch died"))
        }));
        let err = pipeline
            .prepare(source, &plain_profile())
            .unwrap()
            .collect()
            .await
            .unwrap_err();
        assert!(matches!(err, SoriError::Synthesis(_)));
    }

    #[tokio::test]
    async fn test_transcoder_failure_is_reported() {
        // a transcoder that ignores its input and exits non-zero
        let pipeline = AudioPipeline::with_command("false");
        let prepared = pipeline
            .prepare(stream_from_bytes(Bytes::from_static(b"audio")), &filtered_profile())
            .unwrap();
        assert_eq!(prepared.hint(), StreamHint::OggOpus);

        let err = prepared.collect().await.unwrap_err();
        assert!(matches!(err, SoriError::Transcode(_)));
    }

    #[tokio::test]
    async fn test_input_error_kills_transcode() {
        let pipeline = AudioPipeline::with_command("false");
        let source: ByteStream = Box::pin(futures_util::stream::once(async {
            Err(SoriError::synthesis("upstream gone"))
        }));
        let err = pipeline
            .prepare(source, &filtered_profile())
            .unwrap()
            .collect()
            .await
            .unwrap_err();
        assert!(matches!(err, SoriError::Transcode(_)));
    }

    #[tokio::test]
    async fn test_missing_transcoder_binary() {
        let pipeline = AudioPipeline::with_command("definitely-not-a-real-binary");
        let err = pipeline
            .prepare(stream_from_bytes(Bytes::from_static(b"audio")), &filtered_profile())
            .unwrap_err();
        assert!(matches!(err, SoriError::Transcode(_)));
    }
}
