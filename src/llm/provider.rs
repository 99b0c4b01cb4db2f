use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::settings::{ProviderConfig, RetrySettings};
use crate::types::{AppError, AppResult, GenerationOptions, GenerationPrompt, GenerationResult};

/// A pluggable source of text generation.
///
/// Adapters are stateless apart from their HTTP client and are shared
/// read-only across every worker.
#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn generate(
        &self,
        options: &GenerationOptions,
        prompt: &GenerationPrompt,
    ) -> AppResult<GenerationResult>;

    /// Estimated cost in USD for the given token counts
    fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64;

    /// Adapter kind, e.g. "openai" or "local"
    fn kind(&self) -> &str;

    /// Output token ceiling used when a call does not override it
    fn max_tokens(&self) -> u32;

    /// Per-call timeout, scaled by the expected document size
    fn timeout_for(&self, prompt_chars: usize) -> Duration {
        hosted_timeout(prompt_chars)
    }
}

pub const HOSTED_TIMEOUT_CAP_SECS: u64 = 300;
pub const LOCAL_TIMEOUT_CAP_SECS: u64 = 120;

/// Hosted APIs: 60s base + 30s per 10k characters, capped at 5 minutes
pub fn hosted_timeout(prompt_chars: usize) -> Duration {
    scaled_timeout(prompt_chars, 60, 30, HOSTED_TIMEOUT_CAP_SECS)
}

/// Local models: 30s base + 10s per 10k characters, capped at 2 minutes
pub fn local_timeout(prompt_chars: usize) -> Duration {
    scaled_timeout(prompt_chars, 30, 10, LOCAL_TIMEOUT_CAP_SECS)
}

fn scaled_timeout(prompt_chars: usize, base_secs: u64, per_10k_secs: u64, cap_secs: u64) -> Duration {
    let blocks = (prompt_chars / 10_000) as u64;
    Duration::from_secs((base_secs + blocks * per_10k_secs).min(cap_secs))
}

/// Cost from per-1k-token prices
pub fn cost_per_1k(input_tokens: u32, output_tokens: u32, input_price: f64, output_price: f64) -> f64 {
    (input_tokens as f64 / 1000.0) * input_price + (output_tokens as f64 / 1000.0) * output_price
}

/// Coarse usability pre-filter for raw provider output.
///
/// Empty or error-like content scores 0.1, brace-delimited content 1.0,
/// anything else 0.3. This is not schema validation; the structure
/// validator decides real correctness later.
pub fn estimate_confidence(content: &str) -> f64 {
    let trimmed = content.trim();
    if trimmed.is_empty() || is_error_like(trimmed) {
        return 0.1;
    }
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return 1.0;
    }
    0.3
}

fn is_error_like(content: &str) -> bool {
    content.chars().count() < 2
        || content.eq_ignore_ascii_case("error")
        || content.eq_ignore_ascii_case("null")
}

/// Everything a constructor needs to build one adapter
pub struct ProviderContext<'a> {
    pub name: &'a str,
    pub config: &'a ProviderConfig,
    pub retry: &'a RetrySettings,
}

pub type AdapterConstructor =
    Box<dyn Fn(&ProviderContext<'_>) -> AppResult<Arc<dyn LLMAdapter>> + Send + Sync>;

/// Explicit kind -> constructor table, assembled once at startup
pub struct ProviderRegistry {
    constructors: HashMap<String, AdapterConstructor>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with every built-in adapter
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("openai", |ctx| {
            Ok(Arc::new(crate::llm::openai::OpenAIAdapter::new(ctx)?) as Arc<dyn LLMAdapter>)
        });
        registry.register("anthropic", |ctx| {
            Ok(Arc::new(crate::llm::anthropic::AnthropicAdapter::new(ctx)?) as Arc<dyn LLMAdapter>)
        });
        registry.register("google", |ctx| {
            Ok(Arc::new(crate::llm::google::GoogleAdapter::new(ctx)?) as Arc<dyn LLMAdapter>)
        });
        registry.register("local", |ctx| {
            Ok(Arc::new(crate::llm::local::LocalAdapter::new(ctx)?) as Arc<dyn LLMAdapter>)
        });
        registry
    }

    pub fn register<F>(&mut self, kind: &str, constructor: F)
    where
        F: Fn(&ProviderContext<'_>) -> AppResult<Arc<dyn LLMAdapter>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.to_string(), Box::new(constructor));
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn build(&self, ctx: &ProviderContext<'_>) -> AppResult<Arc<dyn LLMAdapter>> {
        let kind = ctx.config.kind_or(ctx.name);
        let constructor = self.constructors.get(kind).ok_or_else(|| {
            AppError::Config(format!("provider {}: unsupported kind '{kind}'", ctx.name))
        })?;
        constructor(ctx)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
