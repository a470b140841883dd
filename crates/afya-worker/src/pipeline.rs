//! Per-job analysis pipeline.
//!
//! Dispatches on the job's processing type, runs the frame and audio paths
//! (concurrently for comprehensive jobs) and merges whatever succeeded into a
//! single [`AnalysisResult`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use afya_inference::{
    GeminiClient, InferenceClient, InferenceError, SpeechClient, SpeechTranscriber,
    TextAnalyzer, Transcription, VisionAnalyzer,
};
use afya_media::{
    check_ffmpeg, check_ffprobe, AudioExtraction, AudioExtractor, CancelToken,
    FfmpegFrameSampler, FrameSampler, JobWorkspace,
};
use afya_models::{AnalysisResult, Job, ProcessingType};
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::registry::JobHandle;

/// Shared components used by every job.
pub struct ProcessingContext {
    pub max_frames: usize,
    pub work_dir: PathBuf,
    pub sampler: Arc<dyn FrameSampler>,
    pub extractor: Arc<dyn AudioExtraction>,
    pub transcriber: Arc<dyn Transcription>,
    pub vision: VisionAnalyzer,
    pub text: TextAnalyzer,
}

impl ProcessingContext {
    pub fn new(
        config: &WorkerConfig,
        sampler: Arc<dyn FrameSampler>,
        extractor: Arc<dyn AudioExtraction>,
        transcriber: Arc<dyn Transcription>,
        client: Arc<dyn InferenceClient>,
    ) -> Self {
        Self {
            max_frames: config.max_frames.max(1),
            work_dir: config.work_dir.clone(),
            sampler,
            extractor,
            transcriber,
            vision: VisionAnalyzer::new(Arc::clone(&client)),
            text: TextAnalyzer::new(client),
        }
    }

    /// Build the production context: FFmpeg-backed media, Gemini and Speech-to-Text.
    pub fn from_env(config: &WorkerConfig) -> WorkerResult<Self> {
        if let Err(e) = check_ffmpeg() {
            warn!("{}; frame sampling and the ffmpeg audio fallback will fail", e);
        }
        if let Err(e) = check_ffprobe() {
            warn!("{}; frame sampling will fail", e);
        }

        let client: Arc<dyn InferenceClient> = Arc::new(GeminiClient::from_env()?);
        let speech = Arc::new(SpeechClient::from_env()?);
        let ffmpeg_timeout = config.ffmpeg_timeout.as_secs();

        let extractor: Arc<dyn AudioExtraction> =
            Arc::new(AudioExtractor::default_chain(ffmpeg_timeout));

        Ok(Self::new(
            config,
            Arc::new(FfmpegFrameSampler::new(ffmpeg_timeout)),
            Arc::clone(&extractor),
            Arc::new(SpeechTranscriber::new(speech, extractor)),
            client,
        ))
    }
}

/// Progress range a pipeline stage reports into.
#[derive(Debug, Clone, Copy)]
struct Band {
    start: u8,
    end: u8,
}

impl Band {
    const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    fn at(self, done: usize, total: usize) -> u8 {
        if total == 0 {
            return self.start;
        }
        let span = usize::from(self.end - self.start);
        self.start + (span * done.min(total) / total) as u8
    }
}

const FRAMES_ONLY: Band = Band::new(5, 90);
const AUDIO_ONLY: Band = Band::new(5, 90);
const COMPREHENSIVE_VISUAL: Band = Band::new(5, 70);
const COMPREHENSIVE_AUDIO: Band = Band::new(5, 60);
const COMBINING: u8 = 90;

/// Transcript plus its analysis, when that succeeded.
#[derive(Debug, Clone)]
struct AudioOutcome {
    transcript: String,
    analysis: Option<String>,
}

impl AudioOutcome {
    fn into_result(self) -> AnalysisResult {
        AnalysisResult::audio(self.transcript, self.analysis)
    }
}

/// Run a job inside its own scratch directory.
///
/// The directory is removed before this returns, whatever the outcome.
pub async fn process_job(
    ctx: &ProcessingContext,
    handle: &JobHandle,
    cancel: &CancelToken,
) -> WorkerResult<AnalysisResult> {
    let job = handle.snapshot();
    let workspace = JobWorkspace::create(&ctx.work_dir, job.id.as_str()).await?;

    let result = analyze(ctx, &job, handle, workspace.path(), cancel).await;

    workspace.cleanup().await;
    result
}

async fn analyze(
    ctx: &ProcessingContext,
    job: &Job,
    handle: &JobHandle,
    work_dir: &Path,
    cancel: &CancelToken,
) -> WorkerResult<AnalysisResult> {
    match job.processing_type {
        ProcessingType::Frames => {
            let summary = visual_path(ctx, job, handle, work_dir, cancel, FRAMES_ONLY).await?;
            Ok(AnalysisResult::visual(summary))
        }
        ProcessingType::Audio => {
            let outcome = audio_path(ctx, job, handle, work_dir, cancel, AUDIO_ONLY).await?;
            Ok(outcome.into_result())
        }
        ProcessingType::Comprehensive => comprehensive(ctx, job, handle, work_dir, cancel).await,
    }
}

async fn comprehensive(
    ctx: &ProcessingContext,
    job: &Job,
    handle: &JobHandle,
    work_dir: &Path,
    cancel: &CancelToken,
) -> WorkerResult<AnalysisResult> {
    let (visual, audio) = tokio::join!(
        visual_path(ctx, job, handle, work_dir, cancel, COMPREHENSIVE_VISUAL),
        audio_path(ctx, job, handle, work_dir, cancel, COMPREHENSIVE_AUDIO),
    );

    if cancel.is_cancelled() {
        return Err(WorkerError::Cancelled);
    }

    match (visual, audio) {
        (Ok(summary), Ok(audio)) => {
            handle.set_progress(COMBINING);
            let combined = combine(ctx, job, &summary, &audio).await;
            Ok(AnalysisResult {
                visual_analysis: Some(summary),
                audio_transcript: Some(audio.transcript),
                audio_analysis: audio.analysis,
                combined_analysis: combined,
                has_audio: true,
                audio_error: None,
            })
        }
        (Ok(summary), Err(audio_err)) => {
            info!(job_id = %job.id, "Audio unavailable, returning visual analysis: {}", audio_err);
            Ok(AnalysisResult {
                audio_error: Some(audio_err.to_string()),
                ..AnalysisResult::visual(summary)
            })
        }
        (Err(visual_err), Ok(audio)) => {
            warn!(job_id = %job.id, "Visual analysis failed, returning audio analysis: {}", visual_err);
            Ok(audio.into_result())
        }
        (Err(visual_err), Err(audio_err)) => Err(WorkerError::AllModalitiesFailed {
            visual: visual_err.to_string(),
            audio: audio_err.to_string(),
        }),
    }
}

/// Sample frames, analyze each, and summarize.
async fn visual_path(
    ctx: &ProcessingContext,
    job: &Job,
    handle: &JobHandle,
    work_dir: &Path,
    cancel: &CancelToken,
    band: Band,
) -> WorkerResult<String> {
    let frames = ctx
        .sampler
        .sample(&job.file_path, ctx.max_frames, work_dir, cancel)
        .await?;
    debug!(job_id = %job.id, frames = frames.total(), "Frames sampled");
    handle.set_progress(band.start);

    let summary = ctx
        .vision
        .analyze_frames(frames, &job.target_language, cancel, |done, total| {
            handle.set_progress(band.at(done, total))
        })
        .await?;

    if summary.trim().is_empty() {
        return Err(InferenceError::EmptyResponse.into());
    }
    Ok(summary)
}

/// Extract audio, transcribe it, and analyze the transcript.
async fn audio_path(
    ctx: &ProcessingContext,
    job: &Job,
    handle: &JobHandle,
    work_dir: &Path,
    cancel: &CancelToken,
    band: Band,
) -> WorkerResult<AudioOutcome> {
    let track = ctx
        .extractor
        .extract(&job.file_path, work_dir, cancel)
        .await?;
    info!(
        job_id = %job.id,
        strategy = %track.strategy,
        duration = track.duration,
        "Audio track ready"
    );
    handle.set_progress(band.at(1, 3));

    if cancel.is_cancelled() {
        return Err(WorkerError::Cancelled);
    }

    let outcome = transcribe_and_analyze(ctx, &track.path, &job.target_language, work_dir).await;
    if let Err(e) = tokio::fs::remove_file(&track.path).await {
        debug!("Could not remove extracted audio {}: {}", track.path.display(), e);
    }

    let outcome = outcome?;
    handle.set_progress(band.end);
    Ok(outcome)
}

/// A transcript whose analysis failed still counts as audio success.
async fn transcribe_and_analyze(
    ctx: &ProcessingContext,
    audio: &Path,
    language: &str,
    work_dir: &Path,
) -> WorkerResult<AudioOutcome> {
    let transcript = ctx.transcriber.transcribe(audio, language, work_dir).await?;
    debug!(chars = transcript.len(), "Transcript ready");

    let analysis = match ctx.text.analyze_transcript(&transcript, language).await {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            warn!("Transcript analysis was empty");
            None
        }
        Err(e) => {
            warn!("Transcript analysis failed: {}", e);
            None
        }
    };

    Ok(AudioOutcome {
        transcript,
        analysis,
    })
}

/// Failures degrade to the single-modality results.
async fn combine(
    ctx: &ProcessingContext,
    job: &Job,
    visual_summary: &str,
    audio: &AudioOutcome,
) -> Option<String> {
    match ctx
        .text
        .combine(
            &audio.transcript,
            audio.analysis.as_deref(),
            visual_summary,
            &job.target_language,
        )
        .await
    {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            warn!(job_id = %job.id, "Combined analysis was empty");
            None
        }
        Err(e) => {
            warn!(job_id = %job.id, "Combining analyses failed: {}", e);
            None
        }
    }
}

/// Describe a single image.
pub async fn analyze_image(
    ctx: &ProcessingContext,
    path: &Path,
    language: &str,
) -> WorkerResult<String> {
    ensure_file(path)?;
    let analysis = ctx.vision.analyze_image(path, language).await?;
    Ok(analysis)
}

/// Return the text visible in an image.
pub async fn extract_text(ctx: &ProcessingContext, path: &Path) -> WorkerResult<String> {
    ensure_file(path)?;
    let text = ctx.vision.extract_text(path).await?;
    Ok(text)
}

/// Answer a typed health question.
pub async fn answer_query(
    ctx: &ProcessingContext,
    message: &str,
    language: &str,
) -> WorkerResult<String> {
    if message.trim().is_empty() {
        return Err(WorkerError::invalid_input("query is empty"));
    }
    let answer = ctx.text.answer_query(message, None, language).await?;
    Ok(answer)
}

/// Translate text into `language`.
pub async fn translate(ctx: &ProcessingContext, text: &str, language: &str) -> WorkerResult<String> {
    if text.trim().is_empty() {
        return Err(WorkerError::invalid_input("text is empty"));
    }
    let translated = ctx.text.translate(text, language).await?;
    Ok(translated)
}

/// Transcribe and analyze a standalone voice note.
pub async fn process_voice(
    ctx: &ProcessingContext,
    path: &Path,
    language: &str,
) -> WorkerResult<AnalysisResult> {
    ensure_file(path)?;
    let workspace = JobWorkspace::create(&ctx.work_dir, "voice").await?;

    let outcome = transcribe_and_analyze(ctx, path, language, workspace.path()).await;

    workspace.cleanup().await;
    outcome.map(AudioOutcome::into_result)
}

pub(crate) fn ensure_file(path: &Path) -> WorkerResult<()> {
    if path.as_os_str().is_empty() {
        return Err(WorkerError::invalid_input("file path is empty"));
    }
    if !path.is_file() {
        return Err(WorkerError::invalid_input(format!(
            "file not found: {}",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_is_monotonic_and_bounded() {
        let band = Band::new(5, 90);
        assert_eq!(band.at(0, 5), 5);
        assert_eq!(band.at(5, 5), 90);
        assert_eq!(band.at(9, 5), 90);
        assert_eq!(band.at(0, 0), 5);

        let steps: Vec<u8> = (0..=5).map(|done| band.at(done, 5)).collect();
        assert!(steps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_ensure_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"data").unwrap();

        assert!(ensure_file(&file).is_ok());
        assert!(matches!(
            ensure_file(&dir.path().join("missing.mp4")),
            Err(WorkerError::InvalidInput(_))
        ));
        assert!(matches!(ensure_file(dir.path()), Err(WorkerError::InvalidInput(_))));
        assert!(matches!(
            ensure_file(Path::new("")),
            Err(WorkerError::InvalidInput(_))
        ));
    }
}
