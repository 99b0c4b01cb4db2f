// Retry and polling utilities

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, Instant};

use crate::settings::RetrySettings;

const MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub retryable_status_codes: Vec<u16>,
}

impl RetryPolicy {
    /// Policy that makes exactly one attempt
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            backoff_factor: 1.0,
            retryable_status_codes: Vec::new(),
        }
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Delay before retry number `attempt` (1-based): base * factor^(attempt-1), with up to 10% jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let base = Duration::from_millis(millis.min(MAX_DELAY.as_millis() as f64) as u64);
        if base.is_zero() {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 10);
        (base + Duration::from_millis(jitter)).min(MAX_DELAY)
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            backoff_factor: settings.backoff_factor.max(1.0),
            retryable_status_codes: settings.retryable_status_codes.clone(),
        }
    }
}

/// Run `operation` until it succeeds, the error is not retryable, or retries are exhausted
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempt += 1;
                if attempt > policy.max_retries || !is_retryable(&error) {
                    return Err(error);
                }

                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Retrying");
                sleep(delay).await;
            }
        }
    }
}

/// Re-check `check` every `interval` until it returns true or `deadline` elapses.
///
/// The first check runs immediately. Returns whether the condition was met.
pub async fn poll_until<F, Fut>(interval: Duration, deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let give_up_at = Instant::now() + deadline;

    loop {
        if check().await {
            return true;
        }
        let now = Instant::now();
        if now >= give_up_at {
            return false;
        }
        sleep(interval.min(give_up_at - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
            retryable_status_codes: vec![503],
        }
    }

    #[test]
    fn test_delay_grows_with_backoff() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            retryable_status_codes: vec![],
        };
        let first = policy.delay_for(1);
        let third = policy.delay_for(3);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(110));
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(440));
    }

    #[tokio::test]
    async fn test_with_retry_stops_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry(
            &fast_policy(2),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            },
            |_| true,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_skips_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry(
            &fast_policy(5),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal".to_string()) }
            },
            |_| false,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_times_out() {
        let checks = AtomicU32::new(0);
        let ready = poll_until(Duration::from_secs(2), Duration::from_secs(5), || {
            checks.fetch_add(1, Ordering::SeqCst);
            async { false }
        })
        .await;
        assert!(!ready);
        // t=0, t=2, t=4, t=5
        assert_eq!(checks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_succeeds_on_later_check() {
        let checks = AtomicU32::new(0);
        let ready = poll_until(Duration::from_secs(2), Duration::from_secs(30), || {
            let n = checks.fetch_add(1, Ordering::SeqCst);
            async move { n >= 2 }
        })
        .await;
        assert!(ready);
        assert_eq!(checks.load(Ordering::SeqCst), 3);
    }
}
