//! Shared data models for the Afya media analysis pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job identifiers and processing types
//! - The job status lifecycle and its allowed transitions
//! - Analysis results and the poll view returned to callers

pub mod analysis;
pub mod job;
pub mod job_status;

// Re-export common types
pub use analysis::{AnalysisResult, JobView};
pub use job::{InvalidTransition, Job, JobId, ParseProcessingTypeError, ProcessingType};
pub use job_status::JobStatus;
