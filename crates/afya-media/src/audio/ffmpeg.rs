//! Audio extraction through an FFmpeg subprocess.

use async_trait::async_trait;
use std::path::Path;

use super::{AudioStrategy, AudioTrack, StrategyError, TARGET_SAMPLE_RATE};
use crate::cancel::CancelToken;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaError;

const STRATEGY_NAME: &str = "ffmpeg-subprocess";

/// Stderr fragments FFmpeg emits when stream selection finds no audio.
const NO_STREAM_MARKERS: &[&str] = &["does not contain any stream", "matches no streams"];

/// `ffmpeg -y -i <in> -vn -ac 1 -acodec pcm_s16le -ar 16000 <out.wav>`.
#[derive(Debug, Clone)]
pub struct FfmpegAudioStrategy {
    timeout_secs: u64,
}

impl FfmpegAudioStrategy {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    fn command(input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .no_video()
            .audio_channels(1)
            .audio_codec("pcm_s16le")
            .audio_sample_rate(TARGET_SAMPLE_RATE)
    }
}

#[async_trait]
impl AudioStrategy for FfmpegAudioStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    async fn extract(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<AudioTrack, StrategyError> {
        let runner = FfmpegRunner::new()
            .with_timeout(self.timeout_secs)
            .with_cancel(cancel.clone());

        match runner.run(&Self::command(input, output)).await {
            Ok(()) => {}
            Err(MediaError::Cancelled) => return Err(StrategyError::Cancelled),
            Err(e) if reports_no_stream(e.stderr()) => return Err(StrategyError::NoAudioStream),
            Err(e) => {
                let detail = e.stderr().map(|s| format!(" ({})", s.trim())).unwrap_or_default();
                return Err(StrategyError::failed(format!("{}{}", e, detail)));
            }
        }

        let len = tokio::fs::metadata(output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if len == 0 {
            return Err(StrategyError::failed("FFmpeg produced no output"));
        }

        AudioTrack::from_wav(output, STRATEGY_NAME).map_err(|e| StrategyError::failed(e.to_string()))
    }
}

fn reports_no_stream(stderr: Option<&str>) -> bool {
    stderr.is_some_and(|s| NO_STREAM_MARKERS.iter().any(|marker| s.contains(marker)))
}
