//! Analysis results and the poll view returned to callers.

use serde::{Deserialize, Serialize};

use crate::{Job, JobId, JobStatus};

/// Per-modality analysis output of a completed job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Narrative summary of the sampled frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_analysis: Option<String>,

    /// Raw speech transcript
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_transcript: Option<String>,

    /// Analysis derived from the transcript
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_analysis: Option<String>,

    /// Integrated narrative (both modalities succeeded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_analysis: Option<String>,

    /// Whether an audio transcript was produced
    #[serde(default)]
    pub has_audio: bool,

    /// Why audio failed while frames still proceeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_error: Option<String>,
}

impl AnalysisResult {
    /// Result carrying only a visual summary.
    pub fn visual(summary: impl Into<String>) -> Self {
        Self {
            visual_analysis: Some(summary.into()),
            ..Default::default()
        }
    }

    /// Result carrying only the audio modality.
    pub fn audio(transcript: impl Into<String>, analysis: Option<String>) -> Self {
        Self {
            audio_transcript: Some(transcript.into()),
            audio_analysis: analysis,
            has_audio: true,
            ..Default::default()
        }
    }
}

/// What a poller sees for a job.
///
/// Progress is reported while the job is still running, result fields once it
/// completed, and the error once it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        match job.status {
            JobStatus::Queued | JobStatus::Processing => Self {
                job_id: job.id.clone(),
                status: job.status,
                progress: Some(job.progress),
                result: None,
                error: None,
            },
            JobStatus::Completed => Self {
                job_id: job.id.clone(),
                status: job.status,
                progress: None,
                result: Some(job.result.clone().unwrap_or_default()),
                error: None,
            },
            JobStatus::Failed => Self {
                job_id: job.id.clone(),
                status: job.status,
                progress: None,
                result: None,
                error: Some(
                    job.error
                        .clone()
                        .unwrap_or_else(|| "Unknown error".to_string()),
                ),
            },
        }
    }
}
