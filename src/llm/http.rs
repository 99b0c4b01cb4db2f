// Shared JSON-over-HTTP plumbing for the hosted and local adapters

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::{AppError, AppResult};
use crate::utils::{with_retry, RetryPolicy};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One failed HTTP attempt
#[derive(Debug)]
struct CallError {
    status: Option<u16>,
    transient: bool,
    message: String,
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// HTTP client bound to one provider name, with its retry policy
pub(crate) struct JsonClient {
    client: Client,
    provider: String,
    retry: RetryPolicy,
}

impl JsonClient {
    pub(crate) fn new(provider: &str, retry: RetryPolicy) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("provider {provider}: cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            provider: provider.to_string(),
            retry,
        })
    }

    pub(crate) fn inner(&self) -> &Client {
        &self.client
    }

    /// POST a JSON body and decode a JSON response, retrying retryable statuses.
    ///
    /// `extract_error` pulls the API's own message out of an error body.
    pub(crate) async fn post_json<B, R>(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &B,
        extract_error: fn(&str) -> Option<String>,
    ) -> AppResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let result = with_retry(
            &self.retry,
            || async {
                let mut request = self.client.post(url).json(body);
                for (name, value) in headers {
                    request = request.header(*name, value);
                }

                let response = request.send().await.map_err(|e| CallError {
                    status: None,
                    transient: e.is_timeout() || e.is_connect(),
                    message: format!("request failed: {e}"),
                })?;

                let status = response.status();
                if !status.is_success() {
                    let error_text = response.text().await.unwrap_or_default();
                    let message = extract_error(&error_text).unwrap_or_else(|| truncate(&error_text, 300));
                    return Err(CallError {
                        status: Some(status.as_u16()),
                        transient: false,
                        message,
                    });
                }

                response.json::<R>().await.map_err(|e| CallError {
                    status: None,
                    transient: false,
                    message: format!("failed to parse response: {e}"),
                })
            },
            |error: &CallError| match error.status {
                Some(status) => self.retry.is_retryable_status(status),
                None => error.transient,
            },
        )
        .await;

        result.map_err(|e| AppError::provider(&self.provider, e.to_string()))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push('…');
        cut
    }
}

/// Error bodies shaped like `{"error": {"message": "..."}}` or `{"error": "..."}`
pub(crate) fn nested_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    match error {
        serde_json::Value::String(message) => Some(message.clone()),
        other => other.get("message")?.as_str().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_error_message() {
        assert_eq!(
            nested_error_message(r#"{"error": {"message": "bad key", "type": "auth"}}"#),
            Some("bad key".to_string())
        );
        assert_eq!(nested_error_message(r#"{"error": "model not found"}"#), Some("model not found".to_string()));
        assert_eq!(nested_error_message("<html>oops</html>"), None);
    }

    #[tokio::test]
    async fn test_post_json_retries_retryable_status() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/x")
            .with_status(503)
            .with_body(r#"{"error": {"message": "overloaded"}}"#)
            .expect(3)
            .create_async()
            .await;

        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            retryable_status_codes: vec![503],
        };
        let client = JsonClient::new("test", policy).unwrap();
        let result: AppResult<serde_json::Value> = client
            .post_json(&format!("{}/x", server.url()), &[], &json!({}), nested_error_message)
            .await;

        failing.assert_async().await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("HTTP 503: overloaded"));
    }

    #[tokio::test]
    async fn test_post_json_does_not_retry_client_errors() {
        let mut server = mockito::Server::new_async().await;
        let unauthorized = server
            .mock("POST", "/x")
            .with_status(401)
            .with_body(r#"{"error": {"message": "invalid api key"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = JsonClient::new("test", RetryPolicy::from(&crate::settings::RetrySettings::default())).unwrap();
        let result: AppResult<serde_json::Value> = client
            .post_json(&format!("{}/x", server.url()), &[], &json!({}), nested_error_message)
            .await;

        unauthorized.assert_async().await;
        assert!(matches!(result, Err(AppError::Provider { .. })));
    }
}
