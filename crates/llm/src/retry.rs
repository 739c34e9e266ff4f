//! Bounded retry with backoff and per-call timeouts.
//!
//! Every LLM call the engine makes goes through [`complete_with_retry`]:
//! a timed-out call is indistinguishable from a transport failure, and a
//! call that still fails after the retry budget surfaces its last error.

use std::time::Duration;

use diligence_core::{AppError, AppResult};

use crate::client::{LlmClient, LlmRequest, LlmResponse};

/// Retry policy applied to a single logical LLM call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,

    /// Base backoff between attempts; doubles per retry
    pub backoff: Duration,

    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given retry attempt (1-based).
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Complete a request, retrying on failure per the policy.
///
/// Each attempt is bounded by `policy.timeout`; elapsing the timeout is
/// treated exactly like a transport failure. Returns the last error once
/// the retry budget is exhausted.
pub async fn complete_with_retry(
    client: &dyn LlmClient,
    request: &LlmRequest,
    policy: &RetryPolicy,
) -> AppResult<LlmResponse> {
    let mut attempt = 0u32;

    loop {
        let result = tokio::time::timeout(policy.timeout, client.complete(request)).await;

        let error = match result {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(e)) => e,
            Err(_elapsed) => AppError::Llm(format!(
                "Call timed out after {}s",
                policy.timeout.as_secs()
            )),
        };

        if attempt >= policy.max_retries {
            tracing::warn!(
                "LLM call failed after {} attempt(s): {}",
                attempt + 1,
                error
            );
            return Err(error);
        }

        attempt += 1;
        let backoff = policy.backoff_for(attempt);
        tracing::debug!(
            "LLM call failed (attempt {}), retrying in {:?}: {}",
            attempt,
            backoff,
            error
        );
        tokio::time::sleep(backoff).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedClient;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(100),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let client = ScriptedClient::new();
        client.push_text("hello");

        let request = LlmRequest::new("prompt", "scripted");
        let response = complete_with_retry(&client, &request, &fast_policy(2))
            .await
            .unwrap();
        assert_eq!(response.content, "hello");
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let client = ScriptedClient::new();
        client.push_error("rate limited");
        client.push_error("rate limited");
        client.push_text("recovered");

        let request = LlmRequest::new("prompt", "scripted");
        let response = complete_with_retry(&client, &request, &fast_policy(2))
            .await
            .unwrap();
        assert_eq!(response.content, "recovered");
        assert_eq!(client.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let client = ScriptedClient::new();
        client.push_error("down");
        client.push_error("down");
        client.push_error("down");

        let request = LlmRequest::new("prompt", "scripted");
        let result = complete_with_retry(&client, &request, &fast_policy(2)).await;
        assert!(matches!(result, Err(AppError::Llm(_))));
        // initial attempt + 2 retries
        assert_eq!(client.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_timeout_is_retried() {
        let client = ScriptedClient::new().with_delay(Duration::from_millis(50));
        client.push_text("too slow");
        client.push_text("fast enough");

        let policy = RetryPolicy {
            max_retries: 1,
            backoff: Duration::from_millis(1),
            timeout: Duration::from_millis(10),
        };

        let request = LlmRequest::new("prompt", "scripted");
        // Both attempts exceed the 10ms budget
        let result = complete_with_retry(&client, &request, &policy).await;
        assert!(matches!(result, Err(AppError::Llm(_))));
    }
}
