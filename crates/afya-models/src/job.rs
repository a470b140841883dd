//! Analysis job definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::{AnalysisResult, JobStatus};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which modalities a job analyzes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingType {
    /// Sampled video frames only
    Frames,
    /// Audio track only (transcript + analysis)
    Audio,
    /// Both modalities, merged into one report
    #[default]
    Comprehensive,
}

impl ProcessingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingType::Frames => "frames",
            ProcessingType::Audio => "audio",
            ProcessingType::Comprehensive => "comprehensive",
        }
    }

    /// Whether the visual modality runs for this type.
    pub fn includes_frames(&self) -> bool {
        matches!(self, ProcessingType::Frames | ProcessingType::Comprehensive)
    }

    /// Whether the audio modality runs for this type.
    pub fn includes_audio(&self) -> bool {
        matches!(self, ProcessingType::Audio | ProcessingType::Comprehensive)
    }
}

impl fmt::Display for ProcessingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unknown processing-type selector.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown processing type: {0}")]
pub struct ParseProcessingTypeError(pub String);

impl FromStr for ProcessingType {
    type Err = ParseProcessingTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "frames" | "visual" | "video" => Ok(ProcessingType::Frames),
            "audio" => Ok(ProcessingType::Audio),
            "comprehensive" | "auto" => Ok(ProcessingType::Comprehensive),
            other => Err(ParseProcessingTypeError(other.to_string())),
        }
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Invalid status transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// A media analysis job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Requested modalities
    pub processing_type: ProcessingType,

    /// Saved upload to analyze
    pub file_path: PathBuf,

    /// Language code the analyses are written in (e.g. "sw")
    pub target_language: String,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100), best effort
    #[serde(default)]
    pub progress: u8,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completed at timestamp (set for both terminal states)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Result payload (Completed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,

    /// Error message (Failed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(
        id: JobId,
        processing_type: ProcessingType,
        file_path: impl Into<PathBuf>,
        target_language: impl Into<String>,
    ) -> Self {
        Self {
            id,
            processing_type,
            file_path: file_path.into(),
            target_language: target_language.into(),
            status: JobStatus::Queued,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(to) {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Move from `Queued` to `Processing`.
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Processing)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Raise progress. Values never decrease and are capped at 100.
    ///
    /// Ignored once the job is terminal.
    pub fn set_progress(&mut self, progress: u8) {
        if self.is_terminal() {
            return;
        }
        self.progress = self.progress.max(progress.min(100));
    }

    /// Mark job as completed.
    pub fn complete(&mut self, result: AnalysisResult) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Mark job as failed.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued() -> Job {
        Job::new(
            JobId::from_string("job-1"),
            ProcessingType::Comprehensive,
            "/tmp/upload.mp4",
            "en",
        )
    }

    #[test]
    fn test_job_creation() {
        let job = queued();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert!(job.result.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_job_state_transitions() {
        let mut job = queued();

        job.start().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());

        job.set_progress(40);
        job.complete(AnalysisResult::default()).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_complete_requires_processing() {
        let mut job = queued();
        let err = job.complete(AnalysisResult::default()).unwrap_err();
        assert_eq!(err.from, JobStatus::Queued);
        assert_eq!(err.to, JobStatus::Completed);
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn test_failed_job_is_frozen() {
        let mut job = queued();
        job.start().unwrap();
        job.fail("boom").unwrap();

        assert!(job.complete(AnalysisResult::default()).is_err());
        assert!(job.start().is_err());
        job.set_progress(90);
        assert_eq!(job.progress, 0);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut job = queued();
        job.start().unwrap();
        job.set_progress(60);
        job.set_progress(30);
        assert_eq!(job.progress, 60);
        job.set_progress(250);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_processing_type_parsing() {
        assert_eq!("frames".parse::<ProcessingType>().unwrap(), ProcessingType::Frames);
        assert_eq!("Audio".parse::<ProcessingType>().unwrap(), ProcessingType::Audio);
        assert_eq!("auto".parse::<ProcessingType>().unwrap(), ProcessingType::Comprehensive);
        assert_eq!(
            " comprehensive ".parse::<ProcessingType>().unwrap(),
            ProcessingType::Comprehensive
        );
        assert!("subtitles".parse::<ProcessingType>().is_err());
    }

    #[test]
    fn test_processing_type_modalities() {
        assert!(ProcessingType::Frames.includes_frames());
        assert!(!ProcessingType::Frames.includes_audio());
        assert!(ProcessingType::Comprehensive.includes_frames());
        assert!(ProcessingType::Comprehensive.includes_audio());
    }
}
