use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{AiBackendKind, AiConfig};

/// A single prompt exchange with the generative service. One request is in
/// flight per user action; there is no batching or deduplication.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub prompt: String,
    /// Per-flow sampling temperature; the backend default applies when unset.
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, prompt: String) -> Self {
        GenerationRequest {
            system: Some(system.into()),
            prompt,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Seam to the external generative service. Tests substitute a scripted
/// implementation so no flow logic depends on the network.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
    fn backend_name(&self) -> &'static str;
    fn model_name(&self) -> &str;
}

#[derive(Clone)]
pub struct AiClient {
    backend: Arc<dyn GenerativeBackend>,
}

impl AiClient {
    pub fn from_config(config: &AiConfig) -> Self {
        let backend: Arc<dyn GenerativeBackend> = match config.backend {
            AiBackendKind::Gemini => Arc::new(GeminiBackend::new(
                config.api_key.clone(),
                config.base_url.clone(),
                config.model.clone(),
            )),
            AiBackendKind::OpenAi => Arc::new(OpenAiBackend::new(
                config.api_key.clone(),
                config.base_url.clone(),
                config.model.clone(),
            )),
        };
        AiClient { backend }
    }

    pub fn with_backend(backend: Arc<dyn GenerativeBackend>) -> Self {
        AiClient { backend }
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        info!(
            backend = self.backend.backend_name(),
            model = %self.backend.model_name(),
            prompt_length = request.prompt.len(),
            "Requesting content generation"
        );
        self.backend.generate(request).await
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }
}

/// Gemini REST backend (the default; the original deployment targeted
/// Google's generative service).
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "topK")]
    top_k: i32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl GeminiBackend {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            model: model.unwrap_or_else(|| "gemini-2.0-flash".to_string()),
        }
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        // Gemini has no separate system slot in this API shape; fold the
        // system message into the prompt.
        let full_prompt = match &request.system {
            Some(system) => format!("{}\n\n{}", system, request.prompt),
            None => request.prompt.clone(),
        };

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: full_prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature.unwrap_or(0.7),
                top_k: 40,
                top_p: 0.9,
                max_output_tokens: 4096,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                backend = self.backend_name(),
                status = %status,
                error = %error_text,
                "Generative service request failed"
            );
            return Err(anyhow!("Gemini request failed: {}", error_text));
        }

        let payload: GeminiResponse = response.json().await?;
        let text = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| anyhow!("No candidates in Gemini response"))?;

        info!(
            backend = self.backend_name(),
            response_length = text.len(),
            "Received generated content"
        );
        Ok(text)
    }

    fn backend_name(&self) -> &'static str {
        "Gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// OpenAI-compatible chat-completions backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenAiBackend {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
        }
    }
}

#[async_trait]
impl GenerativeBackend for OpenAiBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let body = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                backend = self.backend_name(),
                status = %status,
                error = %error_text,
                "Generative service request failed"
            );
            return Err(anyhow!("OpenAI request failed: {}", error_text));
        }

        let payload: ChatResponse = response.json().await?;
        let text = payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("No choices in OpenAI response"))?;

        info!(
            backend = self.backend_name(),
            response_length = text.len(),
            "Received generated content"
        );
        Ok(text)
    }

    fn backend_name(&self) -> &'static str {
        "OpenAI"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Model responses often wrap the JSON payload in markdown fences or prose;
/// cut out the first JSON object or array.
pub fn extract_json(content: &str) -> &str {
    if let Some(start) = content.find("```json") {
        let rest = &content[start + 7..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }

    if let Some(start) = content.find("```") {
        let rest = &content[start + 3..];
        if let Some(end) = rest.find("```") {
            let candidate = rest[..end].trim();
            if candidate.starts_with('{') || candidate.starts_with('[') {
                return candidate;
            }
        }
    }

    if let Some(start) = content.find('{') {
        if let Some(end) = content.rfind('}') {
            if end > start {
                return &content[start..=end];
            }
        }
    }

    if let Some(start) = content.find('[') {
        if let Some(end) = content.rfind(']') {
            if end > start {
                return &content[start..=end];
            }
        }
    }

    content.trim()
}

/// Deserialize a model response against a flow's fixed output schema.
pub fn parse_generated<T: DeserializeOwned>(content: &str) -> Result<T> {
    let payload = extract_json(content);
    serde_json::from_str(payload)
        .map_err(|e| anyhow!("response did not match the expected schema: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        summary: String,
    }

    #[test]
    fn extracts_json_from_markdown_fence() {
        let content = "Here you go:\n```json\n{\"summary\": \"short\"}\n```\nanything else";
        assert_eq!(extract_json(content), "{\"summary\": \"short\"}");
    }

    #[test]
    fn extracts_json_from_plain_fence() {
        let content = "```\n{\"summary\": \"short\"}\n```";
        assert_eq!(extract_json(content), "{\"summary\": \"short\"}");
    }

    #[test]
    fn extracts_bare_object_with_surrounding_prose() {
        let content = "Sure! {\"summary\": \"short\"} Hope that helps.";
        assert_eq!(extract_json(content), "{\"summary\": \"short\"}");
    }

    #[test]
    fn extracts_bare_array() {
        let content = "[1, 2, 3]";
        assert_eq!(extract_json(content), "[1, 2, 3]");
    }

    #[test]
    fn passes_through_unrecognized_content() {
        assert_eq!(extract_json("  no json here  "), "no json here");
    }

    #[test]
    fn parses_into_schema() {
        let parsed: Sample =
            parse_generated("```json\n{\"summary\": \"short\"}\n```").unwrap();
        assert_eq!(
            parsed,
            Sample {
                summary: "short".to_string()
            }
        );
    }

    #[test]
    fn schema_mismatch_is_an_error() {
        let result: Result<Sample> = parse_generated("{\"wrong_field\": 1}");
        assert!(result.is_err());
    }
}
