// OpenAI-compatible chat completions adapter
// Also covers OpenAI-compatible gateways (Groq, OpenRouter, vLLM) through baseURL

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::llm::http::{nested_error_message, JsonClient};
use crate::llm::provider::{cost_per_1k, estimate_confidence, LLMAdapter, ProviderContext};
use crate::types::{AppError, AppResult, GenerationOptions, GenerationPrompt, GenerationResult, TokenUsage};
use crate::utils::RetryPolicy;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAIAdapter {
    client: JsonClient,
    api_key: String,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl OpenAIAdapter {
    pub fn new(ctx: &ProviderContext<'_>) -> AppResult<Self> {
        if ctx.config.credentials.trim().is_empty() {
            return Err(AppError::Config(format!("provider {}: missing API key", ctx.name)));
        }
        Ok(Self {
            client: JsonClient::new(ctx.name, RetryPolicy::from(ctx.retry))?,
            api_key: ctx.config.credentials.clone(),
            api_base: non_empty_or(&ctx.config.base_url, OPENAI_API_BASE),
            model: non_empty_or(&ctx.config.model, DEFAULT_MODEL),
            temperature: ctx.config.temperature,
            max_tokens: ctx.config.max_tokens,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

pub(crate) fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.trim().to_string()
    }
}

#[async_trait]
impl LLMAdapter for OpenAIAdapter {
    async fn generate(
        &self,
        options: &GenerationOptions,
        prompt: &GenerationPrompt,
    ) -> AppResult<GenerationResult> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &prompt.system },
                ChatMessage { role: "user", content: &prompt.user },
            ],
            temperature: options.temperature.unwrap_or(self.temperature),
            max_tokens: options.max_tokens.unwrap_or(self.max_tokens),
            response_format: options.json_output.then_some(ResponseFormat { format_type: "json_object" }),
        };

        let response: ChatResponse = self
            .client
            .post_json(
                &self.completions_url(),
                &[("Authorization", format!("Bearer {}", self.api_key))],
                &request,
                nested_error_message,
            )
            .await?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| AppError::provider(self.kind(), "response contained no choices"))?;
        let content = choice.message.content.clone().unwrap_or_default();
        let tokens_used = response
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(GenerationResult {
            confidence: estimate_confidence(&content),
            content,
            tokens_used,
            model: response.model.unwrap_or_else(|| self.model.clone()),
            provider: self.kind().to_string(),
            timestamp: Utc::now(),
        })
    }

    fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        cost_per_1k(input_tokens, output_tokens, 0.00015, 0.0006)
    }

    fn kind(&self) -> &str {
        "openai"
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
