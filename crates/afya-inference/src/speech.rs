//! Google Speech-to-Text `speech:recognize` client.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RecognitionError, RecognitionResult};

const DEFAULT_BASE_URL: &str = "https://speech.googleapis.com";

/// Inline audio above this size is rejected by the synchronous endpoint.
const DEFAULT_MAX_INLINE_BYTES: usize = 10 * 1024 * 1024;

/// Encoding of the audio bytes sent for recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    /// 16-bit signed little-endian PCM (WAV)
    Linear16 { sample_rate: u32 },
    /// Let the service detect the format from the header
    Unspecified,
}

/// Audio bytes ready to be recognized.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub encoding: AudioEncoding,
}

/// A service that turns speech into text.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Recognize `audio` spoken in `locale` (e.g. `sw-KE`).
    ///
    /// Returns [`RecognitionError::UnintelligibleAudio`] when nothing was recognized.
    async fn recognize(&self, audio: &AudioPayload, locale: &str) -> RecognitionResult<String>;
}

/// Configuration for the speech client.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_inline_bytes: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            max_inline_bytes: DEFAULT_MAX_INLINE_BYTES,
        }
    }
}

impl SpeechConfig {
    /// Create config from environment variables.
    ///
    /// `SPEECH_API_KEY` falls back to `GEMINI_API_KEY`.
    pub fn from_env() -> RecognitionResult<Self> {
        let defaults = Self::default();

        let api_key = ["SPEECH_API_KEY", "GEMINI_API_KEY"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|k| !k.trim().is_empty())
            .ok_or_else(|| RecognitionError::service("SPEECH_API_KEY not set"))?;

        Ok(Self {
            api_key,
            base_url: std::env::var("SPEECH_BASE_URL").unwrap_or(defaults.base_url),
            timeout: Duration::from_secs(
                std::env::var("SPEECH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.timeout.as_secs()),
            ),
            max_inline_bytes: std::env::var("SPEECH_MAX_INLINE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_inline_bytes),
        })
    }
}

#[derive(Debug, Serialize)]
struct RecognizeRequest {
    config: RecognitionConfig,
    audio: RecognitionAudio,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate_hertz: Option<u32>,
    language_code: String,
    enable_automatic_punctuation: bool,
}

#[derive(Debug, Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechResult>,
}

#[derive(Debug, Deserialize)]
struct SpeechResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

impl RecognizeResponse {
    /// Best alternative of every result, joined in order.
    fn transcript(self) -> RecognitionResult<String> {
        let text = self
            .results
            .into_iter()
            .filter_map(|r| r.alternatives.into_iter().next())
            .map(|a| a.transcript.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            Err(RecognitionError::UnintelligibleAudio)
        } else {
            Ok(text)
        }
    }
}

/// Speech-to-Text REST client.
pub struct SpeechClient {
    http: Client,
    config: SpeechConfig,
}

impl SpeechClient {
    pub fn new(config: SpeechConfig) -> RecognitionResult<Self> {
        if config.api_key.is_empty() {
            return Err(RecognitionError::service("Speech API key is empty"));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RecognitionError::service(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> RecognitionResult<Self> {
        Self::new(SpeechConfig::from_env()?)
    }
}

#[async_trait]
impl SpeechRecognizer for SpeechClient {
    async fn recognize(&self, audio: &AudioPayload, locale: &str) -> RecognitionResult<String> {
        if audio.bytes.is_empty() {
            return Err(RecognitionError::UnintelligibleAudio);
        }
        if audio.bytes.len() > self.config.max_inline_bytes {
            return Err(RecognitionError::service(format!(
                "audio is {} bytes, limit is {}",
                audio.bytes.len(),
                self.config.max_inline_bytes
            )));
        }

        let (encoding, sample_rate_hertz) = match audio.encoding {
            AudioEncoding::Linear16 { sample_rate } => (Some("LINEAR16"), Some(sample_rate)),
            AudioEncoding::Unspecified => (None, None),
        };

        let request = RecognizeRequest {
            config: RecognitionConfig {
                encoding,
                sample_rate_hertz,
                language_code: locale.to_string(),
                enable_automatic_punctuation: true,
            },
            audio: RecognitionAudio {
                content: base64::engine::general_purpose::STANDARD.encode(&audio.bytes),
            },
        };

        let url = format!(
            "{}/v1/speech:recognize",
            self.config.base_url.trim_end_matches('/')
        );
        debug!(locale, bytes = audio.bytes.len(), "Sending speech recognition request");

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Speech API returned {}: {}", status, body);
            return Err(RecognitionError::service(format!(
                "Speech API returned {}: {}",
                status, body
            )));
        }

        let parsed: RecognizeResponse = response.json().await.map_err(|e| {
            RecognitionError::service(format!("Failed to parse speech response: {}", e))
        })?;

        parsed.transcript()
    }
}
