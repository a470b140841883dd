//! Inference and recognition error types.

use thiserror::Error;

pub type InferenceResult<T> = Result<T, InferenceError>;
pub type RecognitionResult<T> = Result<T, RecognitionError>;
pub type AnalyzerResult<T> = Result<T, AnalysisError>;

/// Failure of a single generative inference call.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference request failed: {0}")]
    Request(String),

    #[error("Inference service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid inference response: {0}")]
    Parse(String),

    #[error("Inference returned no content")]
    EmptyResponse,

    #[error("Response blocked: {0}")]
    Blocked(String),

    #[error("Inference request timed out")]
    Timeout,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl InferenceError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Failure to turn audio into text.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Could not understand the audio")]
    UnintelligibleAudio,

    #[error("Speech recognition service error: {0}")]
    ServiceError(String),

    #[error("Could not read audio: {0}")]
    Io(#[from] std::io::Error),
}

impl RecognitionError {
    pub fn service(message: impl Into<String>) -> Self {
        Self::ServiceError(message.into())
    }
}

impl From<reqwest::Error> for RecognitionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::ServiceError("request timed out".to_string())
        } else {
            Self::ServiceError(e.to_string())
        }
    }
}

/// Failure of a whole analysis step.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No usable frames: every frame analysis failed")]
    NoUsableFrames,

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("Could not read input: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            AnalysisError::NoUsableFrames.to_string(),
            "No usable frames: every frame analysis failed"
        );
        assert_eq!(
            AnalysisError::from(InferenceError::EmptyResponse).to_string(),
            "Inference returned no content"
        );
        assert_eq!(
            InferenceError::Status {
                status: 503,
                body: "overloaded".into()
            }
            .to_string(),
            "Inference service returned 503: overloaded"
        );
    }
}
