//! Transcript analysis and cross-modal combination.

use std::sync::Arc;

use tracing::debug;

use crate::error::{InferenceError, InferenceResult};
use crate::gemini::InferenceClient;
use crate::prompts;

/// Text-only analyses built on an inference client.
pub struct TextAnalyzer {
    client: Arc<dyn InferenceClient>,
}

impl TextAnalyzer {
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self { client }
    }

    /// Analyze what the user said.
    pub async fn analyze_transcript(&self, transcript: &str, language: &str) -> InferenceResult<String> {
        debug!(chars = transcript.len(), "Analyzing transcript");
        self.client
            .generate_text(&prompts::transcript_prompt(transcript, language))
            .await
    }

    /// Answer a typed health question, optionally grounded in `context`.
    pub async fn answer_query(
        &self,
        message: &str,
        context: Option<&str>,
        language: &str,
    ) -> InferenceResult<String> {
        let message = message.trim();
        if message.is_empty() {
            return Err(InferenceError::InvalidInput("message cannot be empty".to_string()));
        }
        debug!(chars = message.len(), "Answering text query");
        self.client
            .generate_text(&prompts::query_prompt(message, context, language))
            .await
    }

    /// Translate `text` into `language`.
    pub async fn translate(&self, text: &str, language: &str) -> InferenceResult<String> {
        if text.trim().is_empty() {
            return Err(InferenceError::InvalidInput("text cannot be empty".to_string()));
        }
        self.client
            .generate_text(&prompts::translation_prompt(text, language))
            .await
    }

    /// Merge the audio and visual results into one narrative.
    pub async fn combine(
        &self,
        transcript: &str,
        audio_analysis: Option<&str>,
        visual_summary: &str,
        language: &str,
    ) -> InferenceResult<String> {
        debug!(
            has_audio_analysis = audio_analysis.is_some(),
            "Combining audio and visual analyses"
        );
        self.client
            .generate_text(&prompts::combination_prompt(
                transcript,
                audio_analysis,
                visual_summary,
                language,
            ))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::{GeminiClient, GeminiConfig, ImagePayload};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct Echo {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InferenceClient for Echo {
        async fn generate_text(&self, prompt: &str) -> InferenceResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("ok".to_string())
        }

        async fn describe_image(&self, _: &str, _: &ImagePayload) -> InferenceResult<String> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_analyze_transcript_embeds_message() {
        let echo = Arc::new(Echo::default());
        let analyzer = TextAnalyzer::new(echo.clone());

        analyzer.analyze_transcript("is the pill safe?", "sw").await.unwrap();

        let prompts = echo.prompts.lock().unwrap();
        assert!(prompts[0].contains("User's message: is the pill safe?"));
        assert!(prompts[0].contains("Swahili"));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_without_a_call() {
        let echo = Arc::new(Echo::default());
        let analyzer = TextAnalyzer::new(echo.clone());

        let err = analyzer.answer_query("   ", None, "en").await.unwrap_err();
        assert!(matches!(err, InferenceError::InvalidInput(_)));
        let err = analyzer.translate("", "sw").await.unwrap_err();
        assert!(matches!(err, InferenceError::InvalidInput(_)));
        assert!(echo.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answer_query_through_gemini() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/text-model:generateContent"))
            .and(body_string_contains("User Query: what is PrEP?"))
            .and(body_string_contains("Please respond in Swahili"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "**PrEP** ni dawa ya kuzuia VVU."}]},
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(GeminiConfig {
            api_key: "test-key".to_string(),
            base_url: server.uri(),
            text_models: vec!["text-model".to_string()],
            vision_models: vec!["vision-model".to_string()],
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        let analyzer = TextAnalyzer::new(Arc::new(client));

        let answer = analyzer.answer_query(" what is PrEP? ", None, "sw").await.unwrap();
        assert_eq!(answer, "**PrEP** ni dawa ya kuzuia VVU.");
    }

    #[tokio::test]
    async fn test_translate_uses_translation_prompt() {
        let echo = Arc::new(Echo::default());
        let analyzer = TextAnalyzer::new(echo.clone());

        analyzer.translate("Drink water.", "ha").await.unwrap();

        let prompts = echo.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("Translate the following text into Hausa."));
        assert!(prompts[0].ends_with("Drink water."));
    }

    #[tokio::test]
    async fn test_combine_embeds_both_modalities() {
        let echo = Arc::new(Echo::default());
        let analyzer = TextAnalyzer::new(echo.clone());

        analyzer
            .combine("spoken words", Some("audio take"), "visual take", "en")
            .await
            .unwrap();

        let prompts = echo.prompts.lock().unwrap();
        assert!(prompts[0].contains("spoken words"));
        assert!(prompts[0].contains("audio take"));
        assert!(prompts[0].contains("visual take"));
    }
}
