use async_trait::async_trait;
use std::future::Future;
use tracing::warn;

use crate::error::BackendError;
use crate::gateway::RetryPolicy;

/// A language-understanding service that answers a prompt with text.
///
/// The reply is free-form; shaping it into criteria is the analyzer's job.
#[async_trait]
pub trait LanguageBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;

    fn name(&self) -> &str;
}

/// Drive `call` until it succeeds, fails permanently, or `policy` runs out of
/// attempts. Each attempt is bounded by the policy's per-attempt timeout.
pub async fn complete_with_retry<F, Fut>(
    policy: &RetryPolicy,
    mut call: F,
) -> Result<String, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, BackendError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let error = match tokio::time::timeout(policy.attempt_timeout, call()).await {
            Ok(Ok(reply)) => return Ok(reply),
            Ok(Err(error)) => error,
            Err(_) => BackendError::Timeout,
        };

        attempt += 1;
        if !error.is_transient() || attempt >= max_attempts {
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt - 1);
        warn!(
            attempt = attempt,
            max_attempts = max_attempts,
            delay_secs = delay.as_secs_f64(),
            error = %error,
            "backend unavailable, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
