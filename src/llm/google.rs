// Google Gemini generateContent adapter

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::llm::http::{nested_error_message, JsonClient};
use crate::llm::openai::non_empty_or;
use crate::llm::provider::{cost_per_1k, estimate_confidence, LLMAdapter, ProviderContext};
use crate::types::{AppError, AppResult, GenerationOptions, GenerationPrompt, GenerationResult, TokenUsage};
use crate::utils::RetryPolicy;

const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GoogleAdapter {
    client: JsonClient,
    api_key: String,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GoogleAdapter {
    pub fn new(ctx: &ProviderContext<'_>) -> AppResult<Self> {
        if ctx.config.credentials.trim().is_empty() {
            return Err(AppError::Config(format!("provider {}: missing API key", ctx.name)));
        }
        Ok(Self {
            client: JsonClient::new(ctx.name, RetryPolicy::from(ctx.retry))?,
            api_key: ctx.config.credentials.clone(),
            api_base: non_empty_or(&ctx.config.base_url, GOOGLE_API_BASE),
            model: non_empty_or(&ctx.config.model, DEFAULT_MODEL),
            temperature: ctx.config.temperature,
            max_tokens: ctx.config.max_tokens,
        })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl LLMAdapter for GoogleAdapter {
    async fn generate(
        &self,
        options: &GenerationOptions,
        prompt: &GenerationPrompt,
    ) -> AppResult<GenerationResult> {
        let request = GenerateContentRequest {
            system_instruction: Content { role: None, parts: vec![Part { text: &prompt.system }] },
            contents: vec![Content { role: Some("user"), parts: vec![Part { text: &prompt.user }] }],
            generation_config: GenerationConfig {
                temperature: options.temperature.unwrap_or(self.temperature),
                max_output_tokens: options.max_tokens.unwrap_or(self.max_tokens),
                response_mime_type: options.json_output.then_some("application/json"),
            },
        };

        let response: GenerateContentResponse = self
            .client
            .post_json(
                &self.generate_url(),
                &[("x-goog-api-key", self.api_key.clone())],
                &request,
                nested_error_message,
            )
            .await?;

        let candidate = response
            .candidates
            .first()
            .ok_or_else(|| AppError::provider(self.kind(), "response contained no candidates"))?;
        let content: String = candidate
            .content
            .as_ref()
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect::<Vec<_>>().join(""))
            .unwrap_or_default();
        let tokens_used = response
            .usage_metadata
            .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        Ok(GenerationResult {
            confidence: estimate_confidence(&content),
            content,
            tokens_used,
            model: response.model_version.unwrap_or_else(|| self.model.clone()),
            provider: self.kind().to_string(),
            timestamp: Utc::now(),
        })
    }

    fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        cost_per_1k(input_tokens, output_tokens, 0.0001, 0.0004)
    }

    fn kind(&self) -> &str {
        "google"
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{ProviderConfig, RetrySettings};

    #[tokio::test]
    async fn test_generate_reads_first_candidate() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-test:generateContent")
            .match_header("x-goog-api-key", "g-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"candidates": [{"content": {"parts": [{"text": "{}"}], "role": "model"}}],
                    "usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 1, "totalTokenCount": 10}}"#,
            )
            .create_async()
            .await;

        let cfg = ProviderConfig {
            enabled: true,
            credentials: "g-key".to_string(),
            model: "gemini-test".to_string(),
            base_url: server.url(),
            temperature: 0.2,
            max_tokens: 256,
            kind: None,
        };
        let retry = RetrySettings::default();
        let adapter = GoogleAdapter::new(&ProviderContext { name: "google", config: &cfg, retry: &retry }).unwrap();
        let prompt = GenerationPrompt { system: "s".to_string(), user: "u".to_string() };
        let options = GenerationOptions { json_output: true, ..Default::default() };
        let result = adapter.generate(&options, &prompt).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.content, "{}");
        assert_eq!(result.model, "gemini-test");
        assert_eq!(result.tokens_used, TokenUsage::new(9, 1));
    }

    #[tokio::test]
    async fn test_no_candidates_is_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-test:generateContent")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates": []}"#)
            .create_async()
            .await;

        let cfg = ProviderConfig {
            enabled: true,
            credentials: "g-key".to_string(),
            model: "gemini-test".to_string(),
            base_url: server.url(),
            temperature: 0.2,
            max_tokens: 256,
            kind: None,
        };
        let retry = RetrySettings::default();
        let adapter = GoogleAdapter::new(&ProviderContext { name: "google", config: &cfg, retry: &retry }).unwrap();
        let prompt = GenerationPrompt { system: "s".to_string(), user: "u".to_string() };
        let err = adapter.generate(&GenerationOptions::default(), &prompt).await.unwrap_err();
        assert!(matches!(err, AppError::Provider { .. }));
    }
}
