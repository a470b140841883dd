//! Media analysis worker.
//!
//! This crate provides:
//! - An in-memory job registry with single-writer job handles
//! - The per-job pipeline for frames, audio and comprehensive analysis
//! - A bounded job executor with cancellation and graceful shutdown
//! - One-shot image and voice-note helpers

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod registry;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, SubmitRequest, DEFAULT_LANGUAGE};
pub use logging::JobLogger;
pub use pipeline::ProcessingContext;
pub use registry::{JobHandle, JobRegistry};
