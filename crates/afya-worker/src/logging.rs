//! Structured job logging utilities.
//!
//! Every job lifecycle event carries the job id and processing type so one
//! job can be followed through interleaved worker output.

use afya_models::{JobId, ProcessingType};
use tracing::{error, info, warn, Span};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a logger for a job of the given processing type.
    pub fn new(job_id: &JobId, processing_type: ProcessingType) -> Self {
        Self::from_string(job_id.as_str(), processing_type.as_str())
    }

    /// Create a logger for an arbitrary operation, such as a one-shot helper.
    pub fn from_string(job_id: &str, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span attached to the job's detached task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, ProcessingType::Comprehensive);

        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.operation(), "comprehensive");
    }

    #[test]
    fn test_job_logger_from_string() {
        let logger = JobLogger::from_string("voice-1", "process_voice");

        assert_eq!(logger.job_id(), "voice-1");
        assert_eq!(logger.operation(), "process_voice");
    }
}
