//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::command::{check_ffprobe, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Video file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Number of frames in the first video stream (0 if unknown)
    pub frame_count: u64,
    /// Frame rate, `None` when the container does not define one
    pub fps: Option<f64>,
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Video codec
    pub codec: String,
    /// Whether the container carries at least one audio stream
    pub has_audio: bool,
}

impl VideoInfo {
    /// Timestamp in seconds of a frame index, 0 when fps is undefined.
    pub fn timestamp_of(&self, index: u64) -> f64 {
        match self.fps {
            Some(fps) if fps > 0.0 => index as f64 / fps,
            _ => 0.0,
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
    duration: Option<String>,
}

/// Probe a video file for information.
///
/// Frame count comes from the stream header, then from `duration * fps`,
/// and finally from counting packets when the header carries neither.
/// Both ffprobe passes honour the runner's timeout and cancellation.
pub async fn probe_video(path: impl AsRef<Path>, runner: &FfmpegRunner) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let probe = run_ffprobe(
        runner,
        path,
        &["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"],
    )
    .await?;

    let mut info = parse_probe(&probe)?;

    if info.frame_count == 0 {
        debug!("Frame count missing from header, counting packets: {}", path.display());
        let counted = run_ffprobe(
            runner,
            path,
            &[
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-count_packets",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=nb_read_packets",
            ],
        )
        .await?;
        info.frame_count = counted
            .streams
            .first()
            .and_then(|s| parse_u64(s.nb_read_packets.as_deref()))
            .unwrap_or(0);
    }

    Ok(info)
}

async fn run_ffprobe(
    runner: &FfmpegRunner,
    path: &Path,
    args: &[&str],
) -> MediaResult<FfprobeOutput> {
    let mut command = Command::new(check_ffprobe()?);
    command.args(args).arg(path);

    let output = runner.capture(command).await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    Ok(serde_json::from_slice(&output.stdout)?)
}

fn parse_probe(probe: &FfprobeOutput) -> MediaResult<VideoInfo> {
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::empty_or_corrupt("No video stream found"))?;

    let duration = parse_f64(video_stream.duration.as_deref())
        .or_else(|| {
            probe
                .format
                .as_ref()
                .and_then(|f| parse_f64(f.duration.as_deref()))
        })
        .unwrap_or(0.0);

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate));

    let frame_count = parse_u64(video_stream.nb_frames.as_deref())
        .filter(|n| *n > 0)
        .or_else(|| {
            fps.map(|fps| (duration * fps).round())
                .filter(|n| *n >= 1.0)
                .map(|n| n as u64)
        })
        .unwrap_or(0);

    Ok(VideoInfo {
        frame_count,
        fps,
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        has_audio,
    })
}

fn parse_f64(s: Option<&str>) -> Option<f64> {
    s.and_then(|v| v.parse::<f64>().ok()).filter(|v| v.is_finite())
}

fn parse_u64(s: Option<&str>) -> Option<u64> {
    s.and_then(|v| v.parse::<u64>().ok())
}

/// Parse frame rate string (e.g., "30/1" or "29.97"). Zero rates are undefined.
fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> MediaResult<VideoInfo> {
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        parse_probe(&probe)
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
        assert!(parse_frame_rate("0/1").is_none());
    }

    #[test]
    fn test_parse_probe_with_header_frame_count() {
        let info = parse(
            r#"{
                "format": {"duration": "10.0"},
                "streams": [
                    {"codec_type": "video", "codec_name": "h264", "width": 640, "height": 360,
                     "avg_frame_rate": "25/1", "nb_frames": "250"},
                    {"codec_type": "audio", "codec_name": "aac"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(info.frame_count, 250);
        assert_eq!(info.fps, Some(25.0));
        assert!(info.has_audio);
        assert_eq!(info.width, 640);
        assert!((info.timestamp_of(50) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_frame_count_from_duration() {
        let info = parse(
            r#"{
                "format": {"duration": "4.0"},
                "streams": [{"codec_type": "video", "avg_frame_rate": "30/1"}]
            }"#,
        )
        .unwrap();

        assert_eq!(info.frame_count, 120);
        assert!(!info.has_audio);
    }

    #[test]
    fn test_undefined_fps_gives_zero_timestamps() {
        let info = parse(
            r#"{"streams": [{"codec_type": "video", "avg_frame_rate": "0/0", "nb_frames": "3"}]}"#,
        )
        .unwrap();

        assert_eq!(info.fps, None);
        assert_eq!(info.frame_count, 3);
        assert_eq!(info.timestamp_of(2), 0.0);
    }

    #[test]
    fn test_audio_only_is_empty_or_corrupt() {
        let err = parse(r#"{"streams": [{"codec_type": "audio"}]}"#).unwrap_err();
        assert!(matches!(err, MediaError::EmptyOrCorruptVideo(_)));
    }
}
