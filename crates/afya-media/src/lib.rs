//! Media extraction for the Afya analysis pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with timeout and cancellation
//! - FFprobe-based video probing
//! - Evenly spaced frame sampling
//! - Audio extraction through an ordered chain of fallback strategies
//! - Job-scoped scratch directories

pub mod audio;
pub mod cancel;
pub mod command;
pub mod error;
pub mod frames;
pub mod probe;
pub mod workspace;

pub use audio::{
    AudioExtraction, AudioExtractor, AudioStrategy, AudioTrack, FfmpegAudioStrategy,
    NativeDecodeStrategy, StrategyError, StrategyFailure,
};
pub use cancel::{CancelSource, CancelToken};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::{sample_indices, FfmpegFrameSampler, Frame, FrameSampler, SampledFrames};
pub use probe::{probe_video, VideoInfo};
pub use workspace::JobWorkspace;
