//! Provider Orchestrator
//!
//! Produces one [`GenerationResult`] by walking the provider priority list.
//! Each provider call runs under its own timeout and the job's cancellation
//! token; the first success wins and no further provider is invoked.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::provider::{LLMAdapter, ProviderContext, ProviderRegistry};
use crate::llm::rate_limit::GenerationRateLimiter;
use crate::settings::AiConfig;
use crate::types::{AppError, AppResult, GenerationOptions, GenerationPrompt, GenerationResult};

pub struct ProviderOrchestrator {
    providers: HashMap<String, Arc<dyn LLMAdapter>>,
    priority: Vec<String>,
    limiter: GenerationRateLimiter,
}

impl ProviderOrchestrator {
    pub fn new(
        providers: HashMap<String, Arc<dyn LLMAdapter>>,
        priority: Vec<String>,
        limiter: GenerationRateLimiter,
    ) -> Self {
        Self {
            providers,
            priority,
            limiter,
        }
    }

    /// Build adapters for every enabled provider named in the priority list.
    ///
    /// Providers that are unknown, disabled, or fail to construct are skipped with a warning.
    pub fn from_config(config: &AiConfig, registry: &ProviderRegistry) -> Self {
        let mut providers: HashMap<String, Arc<dyn LLMAdapter>> = HashMap::new();

        for name in &config.provider_priority {
            if providers.contains_key(name) {
                continue;
            }
            let Some(provider_config) = config.providers.get(name) else {
                warn!(provider = %name, "Priority entry has no provider configuration, skipping");
                continue;
            };
            if !provider_config.enabled {
                debug!(provider = %name, "Provider disabled, skipping");
                continue;
            }

            let ctx = ProviderContext {
                name,
                config: provider_config,
                retry: &config.retry,
            };
            match registry.build(&ctx) {
                Ok(adapter) => {
                    info!(provider = %name, kind = adapter.kind(), "Registered LLM provider");
                    providers.insert(name.clone(), adapter);
                }
                Err(e) => warn!(provider = %name, error = %e, "Could not construct provider, skipping"),
            }
        }

        Self::new(
            providers,
            config.provider_priority.clone(),
            GenerationRateLimiter::new(&config.rate_limits),
        )
    }

    /// Names of usable providers in the order they will be tried
    pub fn available(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for name in &self.priority {
            if self.providers.contains_key(name) && !seen.contains(name) {
                seen.push(name.clone());
            }
        }
        seen
    }

    pub async fn generate(
        &self,
        options: &GenerationOptions,
        prompt: &GenerationPrompt,
        cancel: &CancellationToken,
    ) -> AppResult<GenerationResult> {
        let candidates = self.available();
        if candidates.is_empty() {
            return Err(AppError::NoProviders);
        }

        let prompt_chars = prompt.char_len();
        let mut attempts = 0;
        let mut last_error: Option<AppError> = None;

        for name in &candidates {
            let Some(adapter) = self.providers.get(name) else {
                continue;
            };
            attempts += 1;
            let timeout = adapter.timeout_for(prompt_chars);
            let estimated_tokens = prompt
                .estimated_tokens()
                .saturating_add(options.max_tokens.unwrap_or_else(|| adapter.max_tokens()));
            let started = Instant::now();

            let call = async {
                self.limiter.acquire(estimated_tokens).await;
                adapter.generate(options, prompt).await
            };

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                outcome = tokio::time::timeout(timeout, call) => outcome,
            };

            match outcome {
                Ok(Ok(result)) => {
                    let cost = adapter.estimate_cost(result.tokens_used.input, result.tokens_used.output);
                    info!(
                        provider = %name,
                        model = %result.model,
                        input_tokens = result.tokens_used.input,
                        output_tokens = result.tokens_used.output,
                        confidence = result.confidence,
                        estimated_cost_usd = cost,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Provider generation succeeded"
                    );
                    return Ok(result);
                }
                Ok(Err(e)) => {
                    warn!(provider = %name, error = %e, "Provider generation failed, trying next");
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(provider = %name, timeout_secs = timeout.as_secs(), "Provider call timed out, trying next");
                    last_error = Some(AppError::Timeout(format!(
                        "provider {name} after {}s",
                        timeout.as_secs()
                    )));
                }
            }
        }

        match last_error {
            Some(e) => Err(AppError::ProvidersExhausted {
                attempts,
                last_error: e.to_string(),
            }),
            None => Err(AppError::NoProviders),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::TokenUsage;
    use crate::settings::RateLimitSettings;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted adapter for orchestrator and pipeline tests
    pub(crate) struct FakeAdapter {
        pub reply: Result<String, String>,
        pub delay: Duration,
        pub timeout: Duration,
        pub max_tokens: u32,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeAdapter {
        fn scripted(reply: Result<String, String>) -> Self {
            Self {
                reply,
                delay: Duration::ZERO,
                timeout: Duration::from_millis(200),
                max_tokens: 0,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn ok(content: &str) -> Self {
            Self::scripted(Ok(content.to_string()))
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self::scripted(Err(message.to_string()))
        }
    }

    #[async_trait]
    impl LLMAdapter for FakeAdapter {
        async fn generate(&self, _options: &GenerationOptions, _prompt: &GenerationPrompt) -> AppResult<GenerationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Ok(content) => Ok(GenerationResult {
                    content: content.clone(),
                    tokens_used: TokenUsage::new(100, 50),
                    confidence: crate::llm::estimate_confidence(content),
                    model: "fake-model".to_string(),
                    provider: "fake".to_string(),
                    timestamp: Utc::now(),
                }),
                Err(message) => Err(AppError::provider("fake", message.clone())),
            }
        }

        fn estimate_cost(&self, _input_tokens: u32, _output_tokens: u32) -> f64 {
            0.0
        }

        fn kind(&self) -> &str {
            "fake"
        }

        fn max_tokens(&self) -> u32 {
            self.max_tokens
        }

        fn timeout_for(&self, _prompt_chars: usize) -> Duration {
            self.timeout
        }
    }

    fn orchestrator(adapters: Vec<(&str, FakeAdapter)>) -> ProviderOrchestrator {
        let priority = adapters.iter().map(|(name, _)| name.to_string()).collect();
        let providers = adapters
            .into_iter()
            .map(|(name, adapter)| (name.to_string(), Arc::new(adapter) as Arc<dyn LLMAdapter>))
            .collect();
        ProviderOrchestrator::new(providers, priority, GenerationRateLimiter::unlimited())
    }

    fn prompt() -> GenerationPrompt {
        GenerationPrompt { system: "s".to_string(), user: "u".to_string() }
    }

    #[tokio::test]
    async fn test_fallback_stops_at_first_success() {
        let a = FakeAdapter::failing("A is down");
        let b = FakeAdapter::ok("{\"title\": \"B\"}");
        let c = FakeAdapter::ok("{\"title\": \"C\"}");
        let (a_calls, b_calls, c_calls) = (a.calls.clone(), b.calls.clone(), c.calls.clone());

        let orchestrator = orchestrator(vec![("a", a), ("b", b), ("c", c)]);
        let result = orchestrator
            .generate(&GenerationOptions::default(), &prompt(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.content, "{\"title\": \"B\"}");
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_failures_aggregate_last_error() {
        let orchestrator = orchestrator(vec![
            ("a", FakeAdapter::failing("first")),
            ("b", FakeAdapter::failing("second")),
        ]);
        let err = orchestrator
            .generate(&GenerationOptions::default(), &prompt(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            AppError::ProvidersExhausted { attempts, last_error } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("second"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_token_budget_counts_provider_max_tokens() {
        let mut adapter = FakeAdapter::ok("{}");
        adapter.max_tokens = 1_000;
        let mut providers: HashMap<String, Arc<dyn LLMAdapter>> = HashMap::new();
        providers.insert("a".to_string(), Arc::new(adapter));
        let limiter = GenerationRateLimiter::new(&RateLimitSettings {
            requests_per_minute: 0,
            tokens_per_minute: 1_000,
        });
        let orchestrator = ProviderOrchestrator::new(providers, vec!["a".to_string()], limiter);

        let options = GenerationOptions::default();
        orchestrator
            .generate(&options, &prompt(), &CancellationToken::new())
            .await
            .unwrap();

        // The first call spent the whole minute's budget on its output ceiling
        let second = tokio::time::timeout(
            Duration::from_millis(50),
            orchestrator.generate(&options, &prompt(), &CancellationToken::new()),
        )
        .await;
        assert!(second.is_err(), "second call should wait for the token budget");
    }

    #[tokio::test]
    async fn test_no_enabled_providers_is_distinct_error() {
        let orchestrator = ProviderOrchestrator::new(
            HashMap::new(),
            vec!["openai".to_string()],
            GenerationRateLimiter::unlimited(),
        );
        let err = orchestrator
            .generate(&GenerationOptions::default(), &prompt(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoProviders));
    }

    #[test]
    fn test_from_config_skips_disabled_and_unknown() {
        // Default config: hosted providers disabled, only "local" enabled
        let mut config = AiConfig::default();
        config.provider_priority.insert(0, "ghost".to_string());
        let orchestrator = ProviderOrchestrator::from_config(&config, &ProviderRegistry::builtin());
        assert_eq!(orchestrator.available(), vec!["local".to_string()]);

        config.providers.get_mut("local").unwrap().enabled = false;
        let orchestrator = ProviderOrchestrator::from_config(&config, &ProviderRegistry::builtin());
        assert!(orchestrator.available().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_falls_through_to_next_provider() {
        let mut slow = FakeAdapter::ok("{}");
        slow.delay = Duration::from_secs(5);
        let fast = FakeAdapter::ok("{\"title\": \"fast\"}");

        let orchestrator = orchestrator(vec![("slow", slow), ("fast", fast)]);
        let result = orchestrator
            .generate(&GenerationOptions::default(), &prompt(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.content, "{\"title\": \"fast\"}");
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_call() {
        let mut slow = FakeAdapter::ok("{}");
        slow.delay = Duration::from_secs(5);
        let orchestrator = orchestrator(vec![("slow", slow)]);

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = orchestrator
            .generate(&GenerationOptions::default(), &prompt(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
    }
}
