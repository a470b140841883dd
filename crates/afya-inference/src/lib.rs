//! Inference for the Afya analysis pipeline.
//!
//! This crate provides:
//! - A Gemini `generateContent` client with model fallback
//! - A Speech-to-Text client and a transcriber that prepares audio for it
//! - Vision and text analyzers that turn media into health-education analyses
//! - Language-to-locale mapping and prompt templates

pub mod error;
pub mod gemini;
pub mod locale;
pub mod prompts;
pub mod speech;
pub mod text;
pub mod transcriber;
pub mod vision;

pub use error::{
    AnalysisError, AnalyzerResult, InferenceError, InferenceResult, RecognitionError,
    RecognitionResult,
};
pub use gemini::{GeminiClient, GeminiConfig, ImagePayload, InferenceClient};
pub use locale::{language_name, recognition_locale};
pub use speech::{AudioEncoding, AudioPayload, SpeechClient, SpeechConfig, SpeechRecognizer};
pub use text::TextAnalyzer;
pub use transcriber::{ensure_wav, SpeechTranscriber, Transcription};
pub use vision::VisionAnalyzer;
