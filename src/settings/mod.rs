//! AI Settings Module
//!
//! Provider map, provider priority, retry, rate-limit, error-handling and
//! processing settings for the document import pipeline. The settings live in
//! a JSON file on disk (see [`storage::ConfigStorage`]); credentials are
//! usually written as `${VAR}` placeholders and resolved from the environment
//! at load time.

pub mod storage;

pub use storage::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{AppError, AppResult};

/// Configuration for one LLM provider entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub enabled: bool,
    /// API key or token; empty for providers that need none
    #[serde(default)]
    pub credentials: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, rename = "baseURL")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Adapter kind; defaults to the provider's name in the map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    4096
}

impl ProviderConfig {
    fn new(enabled: bool, credentials: &str, model: &str, base_url: &str) -> Self {
        Self {
            enabled,
            credentials: credentials.to_string(),
            model: model.to_string(),
            base_url: base_url.to_string(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            kind: None,
        }
    }

    pub fn kind_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.kind.as_deref().unwrap_or(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub retryable_status_codes: Vec<u16>,
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_factor: 2.0,
            retryable_status_codes: vec![408, 429, 500, 502, 503, 504],
            base_delay_ms: 500,
        }
    }
}

/// Zero disables the corresponding limit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            tokens_per_minute: 200_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorHandlingSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    /// Capacity of the in-memory recent-error log
    pub max_errors: usize,
    pub log_level: String,
    /// Minimum acceptable quality score for a generated plan
    pub error_tolerance: f64,
    /// Recover a JSON object embedded in prose or markdown fences
    pub recovery_enabled: bool,
}

impl Default for ErrorHandlingSettings {
    fn default() -> Self {
        Self {
            log_file: None,
            max_errors: 100,
            log_level: "info".to_string(),
            error_tolerance: 0.5,
            recovery_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingSettings {
    pub max_prompt_chars: usize,
    pub preserve_structure: bool,
    pub annotate_headers: bool,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            max_prompt_chars: 60_000,
            preserve_structure: true,
            annotate_headers: true,
        }
    }
}

/// Complete AI configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub provider_priority: Vec<String>,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub rate_limits: RateLimitSettings,
    #[serde(default)]
    pub error_handling: ErrorHandlingSettings,
    #[serde(default)]
    pub processing: ProcessingSettings,
}

impl Default for AiConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderConfig::new(false, "${OPENAI_API_KEY}", "gpt-4o-mini", "https://api.openai.com/v1"),
        );
        providers.insert(
            "anthropic".to_string(),
            ProviderConfig::new(
                false,
                "${ANTHROPIC_API_KEY}",
                "claude-3-5-sonnet-latest",
                "https://api.anthropic.com",
            ),
        );
        providers.insert(
            "google".to_string(),
            ProviderConfig::new(
                false,
                "${GOOGLE_API_KEY}",
                "gemini-2.0-flash",
                "https://generativelanguage.googleapis.com",
            ),
        );
        providers.insert(
            "local".to_string(),
            ProviderConfig::new(
                true,
                "",
                "${LOCAL_LLM_MODEL:llama3.1}",
                "${LOCAL_LLM_URL:http://localhost:11434}",
            ),
        );

        Self {
            providers,
            provider_priority: vec![
                "openai".to_string(),
                "anthropic".to_string(),
                "google".to_string(),
                "local".to_string(),
            ],
            retry: RetrySettings::default(),
            rate_limits: RateLimitSettings::default(),
            error_handling: ErrorHandlingSettings::default(),
            processing: ProcessingSettings::default(),
        }
    }
}

impl AiConfig {
    /// Checks numeric settings and returns non-fatal warnings about the priority list
    pub fn validate(&self) -> AppResult<Vec<String>> {
        for (name, provider) in &self.providers {
            if !(0.0..=2.0).contains(&provider.temperature) {
                return Err(AppError::Config(format!(
                    "provider {name}: temperature {} is outside [0, 2]",
                    provider.temperature
                )));
            }
            if provider.max_tokens == 0 {
                return Err(AppError::Config(format!("provider {name}: maxTokens must be positive")));
            }
        }
        if !(0.0..=1.0).contains(&self.error_handling.error_tolerance) {
            return Err(AppError::Config("errorTolerance must be within [0, 1]".to_string()));
        }
        if self.retry.backoff_factor < 1.0 {
            return Err(AppError::Config("backoffFactor must be at least 1.0".to_string()));
        }
        if self.processing.max_prompt_chars == 0 {
            return Err(AppError::Config("maxPromptChars must be positive".to_string()));
        }

        let mut warnings = Vec::new();
        for name in &self.provider_priority {
            match self.providers.get(name) {
                None => warnings.push(format!("provider priority references unknown provider '{name}'")),
                Some(provider) if !provider.enabled => {
                    warnings.push(format!("provider priority references disabled provider '{name}'"))
                }
                Some(_) => {}
            }
        }
        if !self
            .provider_priority
            .iter()
            .any(|name| self.providers.get(name).is_some_and(|p| p.enabled))
        {
            warnings.push("no enabled provider is listed in providerPriority".to_string());
        }
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_enables_only_local() {
        let config = AiConfig::default();
        let enabled: Vec<_> = config
            .providers
            .iter()
            .filter(|(_, p)| p.enabled)
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(enabled, vec!["local"]);
        assert_eq!(config.provider_priority.last().map(String::as_str), Some("local"));
    }

    #[test]
    fn test_parse_camel_case_file() {
        let raw = r#"{
            "providers": {
                "openai": {"enabled": true, "credentials": "sk-1", "model": "gpt-4o",
                           "baseURL": "http://localhost:9999/v1", "temperature": 0.1, "maxTokens": 2000}
            },
            "providerPriority": ["openai"],
            "retry": {"maxRetries": 5, "backoffFactor": 1.5, "retryableStatusCodes": [429]},
            "rateLimits": {"requestsPerMinute": 10, "tokensPerMinute": 0},
            "errorHandling": {"logFile": "logs/import.log", "maxErrors": 5, "logLevel": "debug",
                              "errorTolerance": 0.3, "recoveryEnabled": false}
        }"#;
        let config: AiConfig = serde_json::from_str(raw).unwrap();
        let openai = &config.providers["openai"];
        assert_eq!(openai.base_url, "http://localhost:9999/v1");
        assert_eq!(openai.max_tokens, 2000);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.rate_limits.tokens_per_minute, 0);
        assert_eq!(config.error_handling.log_file.as_deref(), Some("logs/import.log"));
        assert!(!config.error_handling.recovery_enabled);
        assert_eq!(config.processing, ProcessingSettings::default());
    }

    #[test]
    fn test_validate_warns_on_disabled_priority() {
        let mut config = AiConfig::default();
        config.provider_priority.push("missing".to_string());
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.contains("disabled provider 'openai'")));
        assert!(warnings.iter().any(|w| w.contains("unknown provider 'missing'")));
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut config = AiConfig::default();
        config.providers.get_mut("local").unwrap().temperature = 3.5;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }
}
