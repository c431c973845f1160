//! Google Translate TTS provider
//!
//! Uses the public `translate_tts` endpoint, the same one the translate web
//! client calls. It only accepts short inputs, which is why the core caps
//! utterances at 200 characters before they ever reach this crate.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use std::time::Duration;
use tracing::debug;

use sori_core::{ByteStream, Result, SoriError, SpeechSynthesizer};

const ENDPOINT: &str = "https://translate.google.com/translate_tts";

/// Speech synthesis through Google Translate.
pub struct GoogleTranslateTts {
    client: reqwest::Client,
}

impl Default for GoogleTranslateTts {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleTranslateTts {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    fn request(&self, text: &str, language: &str) -> Result<reqwest::Request> {
        let textlen = text.chars().count().to_string();
        self.client
            .get(ENDPOINT)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", language),
                ("q", text),
                ("total", "1"),
                ("idx", "0"),
                ("textlen", textlen.as_str()),
            ])
            .build()
            .map_err(|e| SoriError::synthesis(format!("failed to build tts request: {}", e)))
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTranslateTts {
    async fn synthesize(&self, text: &str, language: &str) -> Result<ByteStream> {
        let request = self.request(text, language)?;
        debug!(chars = text.chars().count(), language, "fetching tts audio");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| SoriError::synthesis(format!("tts request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SoriError::synthesis(format!(
                "tts request returned {}",
                response.status()
            )));
        }
        if response.content_length() == Some(0) {
            return Err(SoriError::synthesis("tts response body is empty"));
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| SoriError::synthesis(format!("tts stream failed: {}", e)));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_the_expected_query() {
        let tts = GoogleTranslateTts::new();
        let request = tts.request("안녕하세요", "ko").unwrap();
        let url = request.url().as_str();

        assert!(url.starts_with(ENDPOINT));
        assert!(url.contains("client=tw-ob"));
        assert!(url.contains("tl=ko"));
        assert!(url.contains("textlen=5"));
        // the text must be percent-encoded
        assert!(url.contains("q=%EC%95%88%EB%85%95%ED%95%98%EC%84%B8%EC%9A%94"));
    }

    #[test]
    fn test_request_respects_language() {
        let tts = GoogleTranslateTts::new();
        let request = tts.request("hello", "en").unwrap();
        assert!(request.url().as_str().contains("tl=en"));
    }
}
