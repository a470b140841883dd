//! Audio track extraction through an ordered chain of strategies.
//!
//! Each strategy either produces a mono 16 kHz 16-bit WAV, reports that the
//! input has no audio stream, or fails. The first success wins; every other
//! outcome is recorded so the final error says what was tried.

mod ffmpeg;
mod native;

pub use ffmpeg::FfmpegAudioStrategy;
pub use native::NativeDecodeStrategy;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::error::{MediaError, MediaResult};

/// Sample rate every strategy resamples to.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// An extracted audio track on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioTrack {
    /// WAV file path
    pub path: PathBuf,
    /// Samples per second
    pub sample_rate: u32,
    /// Channel count (always 1 for extracted tracks)
    pub channels: u16,
    /// Bits per sample (always 16 for extracted tracks)
    pub bits_per_sample: u16,
    /// Duration in seconds
    pub duration: f64,
    /// Name of the strategy that produced the track
    pub strategy: String,
}

impl AudioTrack {
    /// Describe an existing WAV file from its header.
    pub fn from_wav(path: impl Into<PathBuf>, strategy: impl Into<String>) -> MediaResult<Self> {
        let path = path.into();
        let reader = hound::WavReader::open(&path)
            .map_err(|e| MediaError::decode(format!("Invalid WAV {}: {}", path.display(), e)))?;
        let spec = reader.spec();
        let duration = if spec.sample_rate > 0 {
            reader.duration() as f64 / spec.sample_rate as f64
        } else {
            0.0
        };
        Ok(Self {
            path,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            duration,
            strategy: strategy.into(),
        })
    }
}

/// Why a single strategy did not produce a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// The container has no audio stream. Not a malfunction.
    NoAudioStream,
    /// The job was cancelled while the strategy ran.
    Cancelled,
    /// The strategy could not decode the audio.
    Failed(String),
}

impl StrategyError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Recorded failure of one strategy in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    pub strategy: String,
    pub reason: String,
}

impl StrategyFailure {
    pub fn new(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// One way of getting a WAV track out of a media file.
#[async_trait]
pub trait AudioStrategy: Send + Sync {
    /// Stable name used in logs and failure reports.
    fn name(&self) -> &'static str;

    /// Write the audio of `input` to `output` as mono 16 kHz 16-bit WAV.
    async fn extract(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<AudioTrack, StrategyError>;
}

/// Anything that can pull an audio track out of a media file.
#[async_trait]
pub trait AudioExtraction: Send + Sync {
    /// Extract the audio of `input` into `work_dir`.
    ///
    /// Fails with [`MediaError::NoAudioTrack`] when the input has no audio,
    /// [`MediaError::ExtractionFailed`] when every strategy failed, or
    /// [`MediaError::Cancelled`].
    async fn extract(
        &self,
        input: &Path,
        work_dir: &Path,
        cancel: &CancelToken,
    ) -> MediaResult<AudioTrack>;
}

/// Tries each strategy in order until one produces a track.
pub struct AudioExtractor {
    strategies: Vec<Box<dyn AudioStrategy>>,
}

impl AudioExtractor {
    pub fn new(strategies: Vec<Box<dyn AudioStrategy>>) -> Self {
        Self { strategies }
    }

    /// In-process decoding first, the FFmpeg subprocess as fallback.
    pub fn default_chain(ffmpeg_timeout_secs: u64) -> Self {
        Self::new(vec![
            Box::new(NativeDecodeStrategy),
            Box::new(FfmpegAudioStrategy::new(ffmpeg_timeout_secs)),
        ])
    }

    /// Names of the configured strategies in order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl AudioExtraction for AudioExtractor {
    async fn extract(
        &self,
        input: &Path,
        work_dir: &Path,
        cancel: &CancelToken,
    ) -> MediaResult<AudioTrack> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        tokio::fs::create_dir_all(work_dir).await?;

        let mut failures = Vec::new();
        let mut no_stream_reports = 0usize;

        for strategy in &self.strategies {
            if cancel.is_cancelled() {
                return Err(MediaError::Cancelled);
            }

            let output = work_dir.join(format!("audio_{}.wav", strategy.name()));
            match strategy.extract(input, &output, cancel).await {
                Ok(track) => {
                    info!(
                        strategy = strategy.name(),
                        duration = track.duration,
                        "Extracted audio track from {}",
                        input.display()
                    );
                    return Ok(track);
                }
                Err(StrategyError::NoAudioStream) => {
                    info!(strategy = strategy.name(), "No audio stream in {}", input.display());
                    no_stream_reports += 1;
                    failures.push(StrategyFailure::new(strategy.name(), "no audio stream"));
                }
                Err(StrategyError::Cancelled) => return Err(MediaError::Cancelled),
                Err(StrategyError::Failed(reason)) => {
                    warn!(
                        strategy = strategy.name(),
                        "Audio extraction strategy failed: {}", reason
                    );
                    failures.push(StrategyFailure::new(strategy.name(), reason));
                }
            }
        }

        if no_stream_reports > 0 {
            Err(MediaError::NoAudioTrack)
        } else {
            Err(MediaError::ExtractionFailed { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        name: &'static str,
        outcome: Result<(), StrategyError>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(name: &'static str, outcome: Result<(), StrategyError>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    name,
                    outcome,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl AudioStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn extract(
            &self,
            _input: &Path,
            output: &Path,
            _cancel: &CancelToken,
        ) -> Result<AudioTrack, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone().map(|_| AudioTrack {
                path: output.to_path_buf(),
                sample_rate: TARGET_SAMPLE_RATE,
                channels: 1,
                bits_per_sample: 16,
                duration: 1.0,
                strategy: self.name.to_string(),
            })
        }
    }

    fn input_file(dir: &Path) -> PathBuf {
        let path = dir.join("clip.mp4");
        std::fs::write(&path, b"not really a video").unwrap();
        path
    }

    #[tokio::test]
    async fn test_fallback_runs_after_primary_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(dir.path());
        let (primary, primary_calls) = Scripted::new("primary", Err(StrategyError::failed("bad codec")));
        let (fallback, fallback_calls) = Scripted::new("fallback", Ok(()));

        let extractor = AudioExtractor::new(vec![Box::new(primary), Box::new(fallback)]);
        let track = extractor
            .extract(&input, dir.path(), &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(track.strategy, "fallback");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_stream_tries_fallback_before_reporting() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(dir.path());
        let (primary, _) = Scripted::new("primary", Err(StrategyError::NoAudioStream));
        let (fallback, fallback_calls) = Scripted::new("fallback", Err(StrategyError::NoAudioStream));

        let extractor = AudioExtractor::new(vec![Box::new(primary), Box::new(fallback)]);
        let err = extractor
            .extract(&input, dir.path(), &CancelToken::never())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::NoAudioTrack));
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_failures_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(dir.path());
        let (a, _) = Scripted::new("a", Err(StrategyError::failed("one")));
        let (b, _) = Scripted::new("b", Err(StrategyError::failed("two")));

        let extractor = AudioExtractor::new(vec![Box::new(a), Box::new(b)]);
        let err = extractor
            .extract(&input, dir.path(), &CancelToken::never())
            .await
            .unwrap_err();

        match err {
            MediaError::ExtractionFailed { failures } => {
                assert_eq!(
                    failures,
                    vec![StrategyFailure::new("a", "one"), StrategyFailure::new("b", "two")]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_first_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(dir.path());
        let (a, calls) = Scripted::new("a", Ok(()));
        let (source, token) = CancelToken::new();
        source.cancel();

        let extractor = AudioExtractor::new(vec![Box::new(a)]);
        let err = extractor.extract(&input, dir.path(), &token).await.unwrap_err();

        assert!(matches!(err, MediaError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_default_chain_order() {
        let extractor = AudioExtractor::default_chain(30);
        assert_eq!(
            extractor.strategy_names(),
            vec!["native-decode", "ffmpeg-subprocess"]
        );
    }
}
