//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::audio::StrategyFailure;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Empty or corrupt video: {0}")]
    EmptyOrCorruptVideo(String),

    #[error("No audio track found in media")]
    NoAudioTrack,

    #[error("Audio extraction failed: {}", summarize(.failures))]
    ExtractionFailed { failures: Vec<StrategyFailure> },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an empty/corrupt video error.
    pub fn empty_or_corrupt(message: impl Into<String>) -> Self {
        Self::EmptyOrCorruptVideo(message.into())
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stderr captured from a failed FFmpeg run, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::FfmpegFailed { stderr, .. } | Self::FfprobeFailed { stderr, .. } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }
}

fn summarize(failures: &[StrategyFailure]) -> String {
    if failures.is_empty() {
        return "no strategies configured".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_failed_lists_every_strategy() {
        let err = MediaError::ExtractionFailed {
            failures: vec![
                StrategyFailure::new("native-decode", "unsupported codec"),
                StrategyFailure::new("ffmpeg-subprocess", "exit code 1"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Audio extraction failed: native-decode: unsupported codec; ffmpeg-subprocess: exit code 1"
        );
    }

    #[test]
    fn test_stderr_accessor() {
        let err = MediaError::ffmpeg_failed("boom", Some("bad input".into()), Some(1));
        assert_eq!(err.stderr(), Some("bad input"));
        assert!(MediaError::Cancelled.stderr().is_none());
    }
}
