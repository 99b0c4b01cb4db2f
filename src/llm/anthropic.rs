// Anthropic Messages API adapter

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::llm::http::{nested_error_message, JsonClient};
use crate::llm::openai::non_empty_or;
use crate::llm::provider::{cost_per_1k, estimate_confidence, LLMAdapter, ProviderContext};
use crate::types::{AppError, AppResult, GenerationOptions, GenerationPrompt, GenerationResult, TokenUsage};
use crate::utils::RetryPolicy;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

pub struct AnthropicAdapter {
    client: JsonClient,
    api_key: String,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicAdapter {
    pub fn new(ctx: &ProviderContext<'_>) -> AppResult<Self> {
        if ctx.config.credentials.trim().is_empty() {
            return Err(AppError::Config(format!("provider {}: missing API key", ctx.name)));
        }
        Ok(Self {
            client: JsonClient::new(ctx.name, RetryPolicy::from(ctx.retry))?,
            api_key: ctx.config.credentials.clone(),
            api_base: non_empty_or(&ctx.config.base_url, ANTHROPIC_API_BASE),
            model: non_empty_or(&ctx.config.model, DEFAULT_MODEL),
            temperature: ctx.config.temperature,
            max_tokens: ctx.config.max_tokens,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl LLMAdapter for AnthropicAdapter {
    async fn generate(
        &self,
        options: &GenerationOptions,
        prompt: &GenerationPrompt,
    ) -> AppResult<GenerationResult> {
        // No native JSON mode; the system prompt carries the output contract
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: options.max_tokens.unwrap_or(self.max_tokens),
            temperature: options.temperature.unwrap_or(self.temperature).min(1.0),
            system: &prompt.system,
            messages: vec![Message { role: "user", content: &prompt.user }],
        };

        let response: MessagesResponse = self
            .client
            .post_json(
                &self.messages_url(),
                &[
                    ("x-api-key", self.api_key.clone()),
                    ("anthropic-version", ANTHROPIC_VERSION.to_string()),
                ],
                &request,
                nested_error_message,
            )
            .await?;

        let content: String = response
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        let tokens_used = response
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
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
        cost_per_1k(input_tokens, output_tokens, 0.003, 0.015)
    }

    fn kind(&self) -> &str {
        "anthropic"
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
