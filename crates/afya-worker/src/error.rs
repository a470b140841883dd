//! Worker error types.

use afya_inference::{AnalysisError, InferenceError, RecognitionError};
use afya_media::MediaError;
use afya_models::{InvalidTransition, JobId};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job already exists: {0}")]
    DuplicateJobId(JobId),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Job queue is full ({0} waiting)")]
    QueueFull(usize),

    #[error("Worker is shutting down")]
    ShuttingDown,

    #[error("cancelled")]
    Cancelled,

    #[error("visual: {visual}; audio: {audio}")]
    AllModalitiesFailed { visual: String, audio: String },

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    #[error(transparent)]
    Media(MediaError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    #[error(transparent)]
    Analysis(AnalysisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<MediaError> for WorkerError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::Cancelled => Self::Cancelled,
            other => Self::Media(other),
        }
    }
}

impl From<AnalysisError> for WorkerError {
    fn from(e: AnalysisError) -> Self {
        match e {
            AnalysisError::Cancelled => Self::Cancelled,
            other => Self::Analysis(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afya_models::JobStatus;

    #[test]
    fn test_cancellation_collapses_to_one_variant() {
        assert!(matches!(WorkerError::from(MediaError::Cancelled), WorkerError::Cancelled));
        assert!(matches!(
            WorkerError::from(AnalysisError::Cancelled),
            WorkerError::Cancelled
        ));
        assert_eq!(WorkerError::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_messages() {
        let err = WorkerError::AllModalitiesFailed {
            visual: "No usable frames".into(),
            audio: "No audio track".into(),
        };
        assert_eq!(err.to_string(), "visual: No usable frames; audio: No audio track");

        let err = WorkerError::from(InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Processing,
        });
        assert_eq!(
            err.to_string(),
            "Invalid status transition from completed to processing"
        );

        assert_eq!(
            WorkerError::from(AnalysisError::NoUsableFrames).to_string(),
            "No usable frames: every frame analysis failed"
        );
    }
}
