//! Evenly spaced frame sampling.
//!
//! The sampler probes the video, picks at most `max_frames` indices spread
//! across the whole stream, decodes exactly those frames in a single FFmpeg
//! pass and loads them as RGB buffers.

use async_trait::async_trait;
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

/// A decoded video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 0-based frame index in the source stream
    pub index: u64,
    /// Presentation time in seconds (index / fps)
    pub timestamp: f64,
    /// RGB pixels
    pub image: RgbImage,
}

/// Indices of the frames to sample.
///
/// Returns every index when the video has at most `max_frames` frames,
/// otherwise `floor(i * frame_count / max_frames)` for `i in 0..max_frames`.
pub fn sample_indices(frame_count: u64, max_frames: usize) -> Vec<u64> {
    if frame_count == 0 || max_frames == 0 {
        return Vec::new();
    }

    let max = max_frames as u64;
    if frame_count <= max {
        return (0..frame_count).collect();
    }

    (0..max).map(|i| i * frame_count / max).collect()
}

/// Sampled frames in increasing index order, consumed once.
#[derive(Debug)]
pub struct SampledFrames {
    frames: std::vec::IntoIter<Frame>,
    total: usize,
}

impl SampledFrames {
    /// Wrap already decoded frames, ordering them by index.
    pub fn from_frames(mut frames: Vec<Frame>) -> Self {
        frames.sort_by_key(|f| f.index);
        frames.dedup_by_key(|f| f.index);
        let total = frames.len();
        Self {
            frames: frames.into_iter(),
            total,
        }
    }

    /// Number of frames the sequence started with.
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for SampledFrames {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.frames.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.frames.size_hint()
    }
}

impl ExactSizeIterator for SampledFrames {}

/// Source of sampled frames for a video.
#[async_trait]
pub trait FrameSampler: Send + Sync {
    /// Sample up to `max_frames` evenly spaced frames from `video`.
    ///
    /// `work_dir` is a scratch directory owned by the caller.
    async fn sample(
        &self,
        video: &Path,
        max_frames: usize,
        work_dir: &Path,
        cancel: &CancelToken,
    ) -> MediaResult<SampledFrames>;
}

/// Frame sampler backed by `ffprobe` and a single `ffmpeg` select pass.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSampler {
    timeout_secs: u64,
}

impl FfmpegFrameSampler {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl FrameSampler for FfmpegFrameSampler {
    async fn sample(
        &self,
        video: &Path,
        max_frames: usize,
        work_dir: &Path,
        cancel: &CancelToken,
    ) -> MediaResult<SampledFrames> {
        let runner = FfmpegRunner::new()
            .with_timeout(self.timeout_secs)
            .with_cancel(cancel.clone());

        let info = probe_video(video, &runner).await.map_err(|e| match e {
            MediaError::FileNotFound(_)
            | MediaError::FfprobeNotFound
            | MediaError::Cancelled
            | MediaError::Timeout(_)
            | MediaError::EmptyOrCorruptVideo(_) => e,
            other => MediaError::empty_or_corrupt(other.to_string()),
        })?;

        if info.frame_count == 0 {
            return Err(MediaError::empty_or_corrupt(format!(
                "{} has no decodable frames",
                video.display()
            )));
        }

        let indices = sample_indices(info.frame_count, max_frames);
        info!(
            sampled = indices.len(),
            "Sampling frames from {}: {}",
            video.display(),
            describe(&info)
        );

        let frames_dir = work_dir.join("frames");
        tokio::fs::create_dir_all(&frames_dir).await?;

        let cmd = FfmpegCommand::new(video, frames_dir.join("frame_%04d.jpg"))
            .input_arg("-an")
            .video_filter(select_filter(&indices))
            .output_args(["-fps_mode", "passthrough"])
            .jpeg_quality(2);

        runner.run(&cmd).await?;

        let entries: Vec<(u64, f64, PathBuf)> = indices
            .iter()
            .enumerate()
            .map(|(n, &index)| {
                (
                    index,
                    info.timestamp_of(index),
                    frames_dir.join(format!("frame_{:04}.jpg", n + 1)),
                )
            })
            .collect();

        let frames = tokio::task::spawn_blocking(move || load_frames(entries))
            .await
            .map_err(|e| MediaError::internal(format!("Frame loading task failed: {}", e)))?;

        if frames.is_empty() {
            return Err(MediaError::empty_or_corrupt(format!(
                "No frames could be decoded from {}",
                video.display()
            )));
        }

        Ok(SampledFrames::from_frames(frames))
    }
}

/// `select` expression matching exactly the given frame numbers.
fn select_filter(indices: &[u64]) -> String {
    let terms: Vec<String> = indices.iter().map(|i| format!("eq(n\\,{})", i)).collect();
    format!("select={}", terms.join("+"))
}

/// Load JPEGs written by FFmpeg, skipping any that are missing or unreadable.
fn load_frames(entries: Vec<(u64, f64, PathBuf)>) -> Vec<Frame> {
    let mut frames = Vec::with_capacity(entries.len());
    for (index, timestamp, path) in entries {
        match image::open(&path) {
            Ok(img) => {
                debug!(index, "Loaded frame {}", path.display());
                frames.push(Frame {
                    index,
                    timestamp,
                    image: img.to_rgb8(),
                });
            }
            Err(e) => warn!(index, "Skipping frame that failed to decode: {}", e),
        }
    }
    frames
}

/// Describe a probe for logging.
fn describe(info: &VideoInfo) -> String {
    format!(
        "{}x{} {} ({} frames, {:.2}s)",
        info.width, info.height, info.codec, info.frame_count, info.duration
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64) -> Frame {
        Frame {
            index,
            timestamp: index as f64 / 2.0,
            image: RgbImage::new(2, 2),
        }
    }

    #[test]
    fn test_short_video_keeps_every_frame() {
        assert_eq!(sample_indices(3, 5), vec![0, 1, 2]);
        assert_eq!(sample_indices(5, 5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_ten_frames_five_samples() {
        assert_eq!(sample_indices(10, 5), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_long_video_is_strictly_increasing() {
        for (count, max) in [(11u64, 5usize), (1000, 7), (6, 5), (100_000, 1)] {
            let indices = sample_indices(count, max);
            assert_eq!(indices.len(), max);
            assert_eq!(indices[0], 0);
            assert!(indices.windows(2).all(|w| w[0] < w[1]));
            assert!(*indices.last().unwrap() < count);
        }
    }

    #[test]
    fn test_empty_inputs() {
        assert!(sample_indices(0, 5).is_empty());
        assert!(sample_indices(10, 0).is_empty());
    }

    #[test]
    fn test_select_filter() {
        assert_eq!(
            select_filter(&[0, 2, 4]),
            "select=eq(n\\,0)+eq(n\\,2)+eq(n\\,4)"
        );
    }

    #[test]
    fn test_sampled_frames_are_ordered_and_consumed_once() {
        let mut frames = SampledFrames::from_frames(vec![frame(4), frame(0), frame(2)]);
        assert_eq!(frames.total(), 3);
        assert_eq!(frames.len(), 3);

        let order: Vec<u64> = frames.by_ref().map(|f| f.index).collect();
        assert_eq!(order, vec![0, 2, 4]);
        assert!(frames.next().is_none());
        assert_eq!(frames.total(), 3);
    }

    #[test]
    fn test_load_frames_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("frame_0001.jpg");
        RgbImage::new(4, 4).save(&good).unwrap();

        let frames = load_frames(vec![
            (0, 0.0, good),
            (5, 1.0, dir.path().join("frame_0002.jpg")),
        ]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].index, 0);
        assert_eq!(frames[0].image.dimensions(), (4, 4));
    }

    #[tokio::test]
    async fn test_cancelled_job_stops_before_decoding() {
        if crate::command::check_ffprobe().is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"not really a video").unwrap();
        let (source, token) = CancelToken::new();
        source.cancel();

        let err = FfmpegFrameSampler::new(30)
            .sample(&video, 5, dir.path(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Cancelled), "got {err}");
        assert!(!dir.path().join("frames").exists());
    }
}
