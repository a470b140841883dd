//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{MediaError, MediaResult};

/// Lines of stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path (or pattern)
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-acodec").output_arg(codec)
    }

    /// Drop the video stream.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Set output audio channel count.
    pub fn audio_channels(self, channels: u16) -> Self {
        self.output_arg("-ac").output_arg(channels.to_string())
    }

    /// Set output audio sample rate.
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.output_arg("-ar").output_arg(rate.to_string())
    }

    /// Set JPEG/MJPEG quality scale (2 is near lossless).
    pub fn jpeg_quality(self, q: u8) -> Self {
        self.output_arg("-q:v").output_arg(q.to_string())
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());
        args.push("-nostats".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with timeout and cancellation.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    /// Cancellation signal
    cancel: Option<CancelToken>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

enum WaitOutcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut(u64),
    Cancelled,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command.
    ///
    /// A non-zero exit carries the tail of stderr in [`MediaError::FfmpegFailed`].
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let ffmpeg = check_ffmpeg()?;

        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(MediaError::Cancelled);
        }

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let stderr_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            while let Ok(Some(line)) = reader.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        let result = self.wait_for_completion(&mut child).await;
        let stderr = stderr_handle.await.unwrap_or_default();

        let status = result?;
        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                (!stderr.is_empty()).then_some(stderr),
                status.code(),
            ))
        }
    }

    /// Run any command to completion under the same timeout and cancellation,
    /// collecting its stdout and stderr.
    ///
    /// The exit status is returned as-is; callers decide what a failure means.
    pub async fn capture(&self, mut command: Command) -> MediaResult<Output> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(MediaError::Cancelled);
        }

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("stderr not captured"))?;
        let stdout_handle = tokio::spawn(read_all(stdout));
        let stderr_handle = tokio::spawn(read_all(stderr));

        let status = self.wait_for_completion(&mut child).await?;

        Ok(Output {
            status,
            stdout: stdout_handle.await.unwrap_or_default(),
            stderr: stderr_handle.await.unwrap_or_default(),
        })
    }

    /// Wait for child process with cancellation and timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let timeout_secs = self.timeout_secs;
        let deadline = async move {
            match timeout_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };
        let cancel = self.cancel.clone().unwrap_or_default();

        let outcome = tokio::select! {
            status = child.wait() => WaitOutcome::Exited(status),
            _ = deadline => WaitOutcome::TimedOut(timeout_secs.unwrap_or_default()),
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        };

        match outcome {
            WaitOutcome::Exited(status) => Ok(status?),
            WaitOutcome::TimedOut(secs) => {
                warn!("FFmpeg timed out after {} seconds, killing process", secs);
                let _ = child.kill().await;
                Err(MediaError::Timeout(secs))
            }
            WaitOutcome::Cancelled => {
                info!("FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                Err(MediaError::Cancelled)
            }
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    buf
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.wav")
            .no_video()
            .audio_channels(1)
            .audio_codec("pcm_s16le")
            .audio_sample_rate(16000);

        let args = cmd.build_args();
        assert_eq!(args[0], "-y");
        assert_eq!(
            &args[args.len() - 9..],
            &[
                "input.mp4",
                "-vn",
                "-ac",
                "1",
                "-acodec",
                "pcm_s16le",
                "-ar",
                "16000",
                "output.wav"
            ]
        );
    }

    #[test]
    fn test_input_args_precede_input() {
        let args = FfmpegCommand::new("in.mp4", "out.jpg")
            .input_arg("-an")
            .log_level("warning")
            .build_args();

        let an = args.iter().position(|a| a == "-an").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(an < i);
        assert!(args.contains(&"warning".to_string()));
    }

    fn sleep_command(secs: &str) -> Option<Command> {
        let sleep = which::which("sleep").ok()?;
        let mut command = Command::new(sleep);
        command.arg(secs);
        Some(command)
    }

    #[tokio::test]
    async fn test_capture_collects_stdout() {
        let Ok(echo) = which::which("echo") else {
            return;
        };
        let mut command = Command::new(echo);
        command.arg("{\"streams\": []}");

        let output = FfmpegRunner::new().with_timeout(5).capture(command).await.unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "{\"streams\": []}");
    }

    #[tokio::test]
    async fn test_capture_stops_when_cancelled() {
        let Some(command) = sleep_command("30") else {
            return;
        };
        let (source, token) = CancelToken::new();
        let runner = FfmpegRunner::new().with_cancel(token);

        let task = tokio::spawn(async move { runner.capture(command).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        source.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("capture should return promptly after cancel")
            .unwrap();
        assert!(matches!(result, Err(MediaError::Cancelled)));
    }

    #[tokio::test]
    async fn test_capture_times_out() {
        let Some(command) = sleep_command("30") else {
            return;
        };
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            FfmpegRunner::new().with_timeout(1).capture(command),
        )
        .await
        .expect("capture should honour its own timeout");
        assert!(matches!(result, Err(MediaError::Timeout(1))));
    }

    #[tokio::test]
    async fn test_capture_refuses_when_already_cancelled() {
        let Some(command) = sleep_command("30") else {
            return;
        };
        let (source, token) = CancelToken::new();
        source.cancel();

        let result = FfmpegRunner::new().with_cancel(token).capture(command).await;
        assert!(matches!(result, Err(MediaError::Cancelled)));
    }
}
