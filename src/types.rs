// Type definitions shared across the import pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token accounting for a single generation call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

impl TokenUsage {
    pub fn new(input: u32, output: u32) -> Self {
        Self {
            input,
            output,
            total: input.saturating_add(output),
        }
    }
}

/// Per-call overrides; anything left as `None` falls back to the provider's own configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the provider for a bare JSON object where its API supports it
    pub json_output: bool,
}

/// System instruction plus the user prompt sent to a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationPrompt {
    pub system: String,
    pub user: String,
}

impl GenerationPrompt {
    pub fn char_len(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }

    /// Rough token estimate (4 characters per token) used for rate limiting
    pub fn estimated_tokens(&self) -> u32 {
        u32::try_from(self.char_len() / 4).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub content: String,
    pub tokens_used: TokenUsage,
    /// Heuristic usability estimate in [0, 1]
    pub confidence: f64,
    pub model: String,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid document: {0}")]
    Validation(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("All {attempts} provider(s) failed, last error: {last_error}")]
    ProvidersExhausted { attempts: usize, last_error: String },

    #[error("No LLM providers are configured or enabled")]
    NoProviders,

    #[error("Transformation error: {0}")]
    Transformation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Processing was cancelled")]
    Cancelled,

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Import queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Short message safe to show to end users; details stay in the logs
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(message) | AppError::Extraction(message) => message.clone(),
            AppError::Provider { .. } | AppError::ProvidersExhausted { .. } => {
                "The AI service could not generate a project plan, please try again later".to_string()
            }
            AppError::NoProviders => "No AI provider is configured for document import".to_string(),
            AppError::Transformation(_) => "The generated project plan could not be interpreted".to_string(),
            AppError::Config(_) => "The import service is misconfigured".to_string(),
            AppError::Cancelled => "Processing was cancelled".to_string(),
            AppError::Timeout(_) => "Processing timed out".to_string(),
            AppError::QueueFull { .. } => "The import service is busy, please retry later".to_string(),
            AppError::NotFound(_) => "Job not found".to_string(),
            AppError::NotReady(_) => "Job is not finished yet".to_string(),
            AppError::Internal(_) => "Internal error".to_string(),
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Extraction(_) => "extraction",
            AppError::Provider { .. } | AppError::ProvidersExhausted { .. } | AppError::NoProviders => {
                "provider"
            }
            AppError::Transformation(_) => "transformation",
            AppError::Config(_) => "configuration",
            AppError::Cancelled | AppError::Timeout(_) => "cancellation",
            AppError::QueueFull { .. } | AppError::NotFound(_) | AppError::NotReady(_) => "request",
            AppError::Internal(_) => "internal",
        }
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(120, 30);
        assert_eq!(usage.total, 150);
        assert_eq!(TokenUsage::new(u32::MAX, 1).total, u32::MAX);
    }

    #[test]
    fn test_user_messages_hide_diagnostics() {
        let err = AppError::provider("openai", "HTTP 500: upstream stack trace ...");
        assert!(!err.user_message().contains("stack trace"));

        let exhausted = AppError::ProvidersExhausted {
            attempts: 2,
            last_error: "connection reset".to_string(),
        };
        assert!(!exhausted.user_message().contains("connection reset"));
        assert_eq!(AppError::Cancelled.user_message(), "Processing was cancelled");
    }

    #[test]
    fn test_no_providers_is_distinct_from_provider_failure() {
        assert_ne!(
            AppError::NoProviders.user_message(),
            AppError::provider("local", "down").user_message()
        );
    }
}
