//! Outbound search with timeout, rate-limit handling and exponential backoff.
//!
//! The gateway holds only read-only state, so one instance can serve many
//! concurrent queries.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::candidate::RawHit;
use crate::config::{BackendConfig, SearchConfig};
use crate::error::{Result, ScoutError, SearchError};
use crate::search::{SearchQuery, SearchSurface};

/// Retry schedule for transient search failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    /// Maximum jitter as a fraction of the computed delay.
    pub jitter_ratio: f64,
    /// Per-attempt timeout.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for RetryPolicy {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            multiplier: config.multiplier,
            jitter: config.jitter,
            jitter_ratio: config.jitter_ratio,
            attempt_timeout: config.timeout(),
        }
    }
}

impl From<&BackendConfig> for RetryPolicy {
    /// Fixed doubling schedule for an overloaded language backend.
    fn from(config: &BackendConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            multiplier: 2.0,
            jitter: false,
            jitter_ratio: 0.0,
            attempt_timeout: config.timeout(),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt `attempt` (0-indexed), before jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        if capped.is_finite() {
            Duration::from_secs_f64(capped.max(0.0))
        } else {
            self.max_delay
        }
    }

    /// The full wait before the next attempt, honouring a server-supplied
    /// retry-after hint and the delay cap.
    fn wait_after(&self, attempt: u32, error: &SearchError) -> Duration {
        let mut delay = self.delay_for_attempt(attempt);
        if let SearchError::RateLimited {
            retry_after: Some(hint),
        } = error
        {
            delay = delay.max(*hint).min(self.max_delay);
        }
        if self.jitter {
            delay = add_jitter(delay, self.jitter_ratio).min(self.max_delay);
        }
        delay
    }
}

pub struct SearchGateway {
    surface: Arc<dyn SearchSurface>,
    policy: RetryPolicy,
}

impl SearchGateway {
    pub fn new(surface: Arc<dyn SearchSurface>, policy: RetryPolicy) -> Self {
        Self { surface, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run one query to completion.
    ///
    /// Transient failures are retried with the same query until the attempt
    /// budget runs out, then surface as [`ScoutError::SearchUnavailable`].
    /// Permanent failures return [`ScoutError::SearchRejected`] immediately.
    #[instrument(skip(self, query), fields(surface = self.surface.name(), query = %query.text))]
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<RawHit>> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let outcome =
                match tokio::time::timeout(self.policy.attempt_timeout, self.surface.search(query))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SearchError::Timeout),
                };

            let error = match outcome {
                Ok(hits) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "search succeeded after retry");
                    }
                    debug!(hits = hits.len(), "search returned");
                    return Ok(hits);
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                warn!(error = %error, "permanent search failure, not retrying");
                return Err(ScoutError::SearchRejected(error));
            }

            attempt += 1;
            if attempt >= max_attempts {
                warn!(attempts = attempt, error = %error, "all search attempts exhausted");
                return Err(ScoutError::SearchUnavailable {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.policy.wait_after(attempt - 1, &error);
            warn!(
                attempt = attempt,
                max_attempts = max_attempts,
                delay_secs = delay.as_secs_f64(),
                error = %error,
                "transient search failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn add_jitter(delay: Duration, ratio: f64) -> Duration {
    let range = delay.as_secs_f64() * ratio.clamp(0.0, 1.0);
    Duration::from_secs_f64(delay.as_secs_f64() + pseudo_random_unit() * range)
}

/// Cheap value in [0, 1) from the clock's sub-second nanos. Good enough to
/// keep concurrent retries from lining up.
fn pseudo_random_unit() -> f64 {
    use std::time::SystemTime;

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let hash = nanos.wrapping_mul(2_654_435_761);
    f64::from(hash) / (f64::from(u32::MAX) + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSearchSurface;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let policy = policy();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_after_hint_is_honoured_but_capped() {
        let policy = policy();
        let hinted = SearchError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(policy.wait_after(0, &hinted), Duration::from_secs(7));

        let huge = SearchError::RateLimited {
            retry_after: Some(Duration::from_secs(600)),
        };
        assert_eq!(policy.wait_after(0, &huge), Duration::from_secs(30));
    }

    #[test]
    fn test_backend_schedule_doubles_from_config() {
        let policy = RetryPolicy::from(&BackendConfig::default());
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(120));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_within_ratio() {
        let delay = add_jitter(Duration::from_secs(10), 0.2);
        assert!(delay >= Duration::from_secs(10));
        assert!(delay <= Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_transient_exhausts_exact_attempts() {
        let surface = Arc::new(MockSearchSurface::failing(SearchError::RateLimited {
            retry_after: None,
        }));
        let gateway = SearchGateway::new(surface.clone(), policy());

        let started = tokio::time::Instant::now();
        let err = gateway.search(&SearchQuery::new("crm")).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(
            err,
            ScoutError::SearchUnavailable { attempts: 5, .. }
        ));
        assert_eq!(surface.calls(), 5);
        // 1 + 2 + 4 + 8 seconds between five attempts.
        assert!(elapsed >= Duration::from_secs(15));
        assert!(elapsed < Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let surface = Arc::new(MockSearchSurface::failing(SearchError::Rejected {
            status: 401,
            message: "bad key".into(),
        }));
        let gateway = SearchGateway::new(surface.clone(), policy());

        let err = gateway.search(&SearchQuery::new("crm")).await.unwrap_err();
        assert!(matches!(err, ScoutError::SearchRejected(_)));
        assert_eq!(surface.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let surface = Arc::new(MockSearchSurface::new());
        surface.push_error(SearchError::Server {
            status: 503,
            message: "overloaded".into(),
        });
        surface.push_error(SearchError::Timeout);
        surface.push_hits(vec![RawHit::new().with("link", "https://github.com/a/b")]);
        let gateway = SearchGateway::new(surface.clone(), policy());

        let hits = gateway.search(&SearchQuery::new("crm")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(surface.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_surface_counts_as_timeout() {
        let surface = Arc::new(MockSearchSurface::new().with_latency(Duration::from_secs(60)));
        let gateway = SearchGateway::new(
            surface.clone(),
            RetryPolicy {
                max_attempts: 2,
                ..policy()
            },
        );

        let err = gateway.search(&SearchQuery::new("crm")).await.unwrap_err();
        assert!(matches!(
            err,
            ScoutError::SearchUnavailable {
                attempts: 2,
                last_error: SearchError::Timeout
            }
        ));
    }
}
