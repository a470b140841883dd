//! Gemini `generateContent` client.
//!
//! Text and vision calls share the same endpoint. Each call walks an ordered
//! list of models and returns the first non-empty answer.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{InferenceError, InferenceResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_TEXT_MODELS: &[&str] = &["gemini-2.0-flash", "gemini-1.5-flash"];
const DEFAULT_VISION_MODELS: &[&str] = &["gemini-1.5-flash", "gemini-2.0-flash"];

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// An encoded image sent inline with a prompt.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImagePayload {
    pub fn jpeg(data: Vec<u8>) -> Self {
        Self {
            mime_type: "image/jpeg".to_string(),
            data,
        }
    }
}

/// A generative model that answers text and image prompts.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Answer a text-only prompt.
    async fn generate_text(&self, prompt: &str) -> InferenceResult<String>;

    /// Answer a prompt about one image.
    async fn describe_image(&self, prompt: &str, image: &ImagePayload) -> InferenceResult<String>;
}

/// Configuration for the Gemini client.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key passed as the `key` query parameter
    pub api_key: String,
    /// Endpoint root, overridable for tests
    pub base_url: String,
    /// Models tried in order for text prompts
    pub text_models: Vec<String>,
    /// Models tried in order for image prompts
    pub vision_models: Vec<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            text_models: DEFAULT_TEXT_MODELS.iter().map(|m| m.to_string()).collect(),
            vision_models: DEFAULT_VISION_MODELS.iter().map(|m| m.to_string()).collect(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl GeminiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> InferenceResult<Self> {
        let defaults = Self::default();

        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| InferenceError::config("GEMINI_API_KEY not set"))?;

        Ok(Self {
            api_key,
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            text_models: model_list("GEMINI_TEXT_MODELS").unwrap_or(defaults.text_models),
            vision_models: model_list("GEMINI_VISION_MODELS").unwrap_or(defaults.vision_models),
            timeout: Duration::from_secs(
                std::env::var("GEMINI_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.timeout.as_secs()),
            ),
        })
    }
}

fn model_list(var: &str) -> Option<Vec<String>> {
    let models: Vec<String> = std::env::var(var)
        .ok()?
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect();
    (!models.is_empty()).then_some(models)
}

/// Gemini API client.
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

/// Gemini API request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 2048,
        }
    }
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

/// Gemini API response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate, or why there is none.
    fn into_text(self) -> InferenceResult<String> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(InferenceError::Blocked(reason));
        }

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or(InferenceError::EmptyResponse)?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if !text.trim().is_empty() {
            return Ok(text.trim().to_string());
        }

        match candidate.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST")) => {
                Err(InferenceError::Blocked(reason.to_string()))
            }
            _ => Err(InferenceError::EmptyResponse),
        }
    }
}

impl GeminiClient {
    /// Create a new Gemini client.
    pub fn new(config: GeminiConfig) -> InferenceResult<Self> {
        if config.api_key.is_empty() {
            return Err(InferenceError::config("Gemini API key is empty"));
        }
        if config.text_models.is_empty() || config.vision_models.is_empty() {
            return Err(InferenceError::config("Gemini model list is empty"));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InferenceError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> InferenceResult<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    /// Try each model in order, returning the first answer.
    async fn generate_with_fallback(
        &self,
        models: &[String],
        request: &GenerateRequest<'_>,
    ) -> InferenceResult<String> {
        let mut last_error = None;

        for model in models {
            debug!("Attempting Gemini API with model: {}", model);
            match self.call_gemini_api(model, request).await {
                Ok(text) => {
                    info!(model = %model, chars = text.len(), "Gemini call succeeded");
                    return Ok(text);
                }
                Err(e) => {
                    warn!("Failed with model {}: {}", model, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| InferenceError::config("No Gemini models configured")))
    }

    /// Call Gemini API.
    async fn call_gemini_api(
        &self,
        model: &str,
        request: &GenerateRequest<'_>,
    ) -> InferenceResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status { status, body });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::parse(format!("Failed to parse Gemini response: {}", e)))?;

        parsed.into_text()
    }

    fn request<'a>(parts: Vec<Part<'a>>) -> GenerateRequest<'a> {
        GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig::default(),
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> InferenceResult<String> {
        let request = Self::request(vec![Part {
            text: Some(prompt),
            inline_data: None,
        }]);
        self.generate_with_fallback(&self.config.text_models, &request)
            .await
    }

    async fn describe_image(&self, prompt: &str, image: &ImagePayload) -> InferenceResult<String> {
        let request = Self::request(vec![
            Part {
                text: Some(prompt),
                inline_data: None,
            },
            Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(&image.data),
                }),
            },
        ]);
        self.generate_with_fallback(&self.config.vision_models, &request)
            .await
    }
}
