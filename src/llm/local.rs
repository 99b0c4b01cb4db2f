// Local self-hosted model adapter (Ollama-style /api/chat)
// The server may still be starting or loading the model, so readiness is polled first

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::http::{nested_error_message, JsonClient};
use crate::llm::openai::non_empty_or;
use crate::llm::provider::{estimate_confidence, local_timeout, LLMAdapter, ProviderContext};
use crate::types::{AppError, AppResult, GenerationOptions, GenerationPrompt, GenerationResult, TokenUsage};
use crate::utils::{poll_until, RetryPolicy};

const LOCAL_API_BASE: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.1";
const READINESS_INTERVAL: Duration = Duration::from_secs(2);
const READINESS_DEADLINE: Duration = Duration::from_secs(20);

pub struct LocalAdapter {
    client: JsonClient,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    readiness_deadline: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: ModelOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ModelOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    message: ResponseMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

impl LocalAdapter {
    pub fn new(ctx: &ProviderContext<'_>) -> AppResult<Self> {
        Ok(Self {
            client: JsonClient::new(ctx.name, RetryPolicy::from(ctx.retry))?,
            api_base: non_empty_or(&ctx.config.base_url, LOCAL_API_BASE),
            model: non_empty_or(&ctx.config.model, DEFAULT_MODEL),
            temperature: ctx.config.temperature,
            max_tokens: ctx.config.max_tokens,
            readiness_deadline: READINESS_DEADLINE,
        })
    }

    pub fn with_readiness_deadline(mut self, deadline: Duration) -> Self {
        self.readiness_deadline = deadline;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), path)
    }

    async fn is_ready(&self) -> bool {
        match self.client.inner().get(self.url("/api/tags")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Local model server not reachable yet");
                false
            }
        }
    }

    async fn wait_until_ready(&self) -> AppResult<()> {
        if poll_until(READINESS_INTERVAL, self.readiness_deadline, || self.is_ready()).await {
            return Ok(());
        }
        warn!(base = %self.api_base, "Local model server did not become ready");
        Err(AppError::provider(
            self.kind(),
            format!("server at {} not ready after {}s", self.api_base, self.readiness_deadline.as_secs()),
        ))
    }
}

#[async_trait]
impl LLMAdapter for LocalAdapter {
    async fn generate(
        &self,
        options: &GenerationOptions,
        prompt: &GenerationPrompt,
    ) -> AppResult<GenerationResult> {
        self.wait_until_ready().await?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &prompt.system },
                ChatMessage { role: "user", content: &prompt.user },
            ],
            stream: false,
            format: options.json_output.then_some("json"),
            options: ModelOptions {
                temperature: options.temperature.unwrap_or(self.temperature),
                num_predict: options.max_tokens.unwrap_or(self.max_tokens),
            },
        };

        let response: ChatResponse = self
            .client
            .post_json(&self.url("/api/chat"), &[], &request, nested_error_message)
            .await?;

        let content = response.message.content;
        Ok(GenerationResult {
            confidence: estimate_confidence(&content),
            content,
            tokens_used: TokenUsage::new(response.prompt_eval_count, response.eval_count),
            model: response.model.unwrap_or_else(|| self.model.clone()),
            provider: self.kind().to_string(),
            timestamp: Utc::now(),
        })
    }

    fn estimate_cost(&self, _input_tokens: u32, _output_tokens: u32) -> f64 {
        0.0
    }

    fn kind(&self) -> &str {
        "local"
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn timeout_for(&self, prompt_chars: usize) -> Duration {
        local_timeout(prompt_chars)
    }
}
