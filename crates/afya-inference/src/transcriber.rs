//! Audio file to transcript.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use afya_media::{AudioExtraction, CancelToken};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{RecognitionError, RecognitionResult};
use crate::locale::recognition_locale;
use crate::speech::{AudioEncoding, AudioPayload, SpeechRecognizer};

/// Anything that can turn an audio file into text.
#[async_trait]
pub trait Transcription: Send + Sync {
    /// Transcribe `audio` spoken in `language`. `work_dir` holds any converted copy.
    async fn transcribe(
        &self,
        audio: &Path,
        language: &str,
        work_dir: &Path,
    ) -> RecognitionResult<String>;
}

/// Converts audio to WAV when needed and sends it to a recognizer.
pub struct SpeechTranscriber {
    recognizer: Arc<dyn SpeechRecognizer>,
    converter: Arc<dyn AudioExtraction>,
}

impl SpeechTranscriber {
    /// `converter` turns non-WAV input (webm, ogg, m4a...) into 16-bit PCM WAV.
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, converter: Arc<dyn AudioExtraction>) -> Self {
        Self {
            recognizer,
            converter,
        }
    }
}

#[async_trait]
impl Transcription for SpeechTranscriber {
    async fn transcribe(
        &self,
        audio: &Path,
        language: &str,
        work_dir: &Path,
    ) -> RecognitionResult<String> {
        let source = ensure_wav(audio, work_dir, self.converter.as_ref()).await;
        let payload = load_payload(&source).await?;
        let locale = recognition_locale(language);

        info!(locale, "Transcribing {}", source.display());
        let transcript = self.recognizer.recognize(&payload, locale).await?;

        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(RecognitionError::UnintelligibleAudio);
        }
        Ok(transcript.to_string())
    }
}

/// Path of a 16-bit PCM WAV version of `audio`.
///
/// Anything else goes through `converter` into `work_dir/converted`. Falls
/// back to the original file when every conversion fails.
pub async fn ensure_wav(audio: &Path, work_dir: &Path, converter: &dyn AudioExtraction) -> PathBuf {
    if is_pcm16_wav(audio) {
        return audio.to_path_buf();
    }

    let out_dir = work_dir.join("converted");
    match converter.extract(audio, &out_dir, &CancelToken::never()).await {
        Ok(track) => {
            debug!(
                strategy = %track.strategy,
                "Converted {} to WAV ({:.2}s)",
                audio.display(),
                track.duration
            );
            track.path
        }
        Err(e) => {
            warn!("WAV conversion failed, using original file: {}", e);
            audio.to_path_buf()
        }
    }
}

fn is_pcm16_wav(path: &Path) -> bool {
    let is_wav_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
    is_wav_ext && pcm16_rate(path).is_some()
}

/// Sample rate of a 16-bit integer PCM WAV file.
fn pcm16_rate(path: &Path) -> Option<u32> {
    let reader = hound::WavReader::open(path).ok()?;
    let spec = reader.spec();
    (spec.sample_format == hound::SampleFormat::Int && spec.bits_per_sample == 16)
        .then_some(spec.sample_rate)
}

async fn load_payload(path: &Path) -> RecognitionResult<AudioPayload> {
    let bytes = tokio::fs::read(path).await?;
    let encoding = match pcm16_rate(path) {
        Some(sample_rate) => AudioEncoding::Linear16 { sample_rate },
        None => AudioEncoding::Unspecified,
    };
    Ok(AudioPayload { bytes, encoding })
}
