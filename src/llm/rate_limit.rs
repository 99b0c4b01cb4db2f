// Request and token rate limiting for provider calls, shared by every worker

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::debug;

use crate::settings::RateLimitSettings;

pub struct GenerationRateLimiter {
    requests: Option<DefaultDirectRateLimiter>,
    tokens: Option<(DefaultDirectRateLimiter, NonZeroU32)>,
}

impl GenerationRateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let requests = NonZeroU32::new(settings.requests_per_minute)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));
        let tokens = NonZeroU32::new(settings.tokens_per_minute)
            .map(|tpm| (RateLimiter::direct(Quota::per_minute(tpm)), tpm));
        Self { requests, tokens }
    }

    pub fn unlimited() -> Self {
        Self {
            requests: None,
            tokens: None,
        }
    }

    /// Wait until one request carrying `estimated_tokens` may be sent.
    ///
    /// Requests larger than the whole per-minute token budget are charged the full budget.
    pub async fn acquire(&self, estimated_tokens: u32) {
        if let Some(limiter) = &self.requests {
            limiter.until_ready().await;
        }
        if let Some((limiter, capacity)) = &self.tokens {
            let cost = NonZeroU32::new(estimated_tokens.min(capacity.get())).unwrap_or(NonZeroU32::MIN);
            if let Err(e) = limiter.until_n_ready(cost).await {
                debug!(error = %e, "Token budget smaller than request, not throttling");
            }
        }
    }
}
