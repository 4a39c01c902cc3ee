//! Retrying gateway: bounded exponential backoff around any gateway.
//!
//! Only transient failures (network, timeout, rate limit, 5xx) are retried.
//! For streams, only opening the stream is retried; once deltas flow, an
//! interruption is surfaced as-is.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use counsel_config::RetryConfig;
use counsel_core::GatewayError;
use counsel_core::gateway::*;

/// Backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exp);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay for a specific error; a rate limit's hint wins over the
    /// schedule but never exceeds `max_delay`.
    fn delay_after(&self, attempt: u32, error: &GatewayError) -> Duration {
        match error {
            GatewayError::RateLimited { retry_after_secs } => {
                Duration::from_secs(*retry_after_secs).min(self.max_delay)
            }
            _ => self.delay_for(attempt),
        }
    }
}

/// Wraps a gateway and retries transient failures.
pub struct RetryingGateway {
    inner: Arc<dyn Gateway>,
    policy: RetryPolicy,
}

impl RetryingGateway {
    pub fn new(inner: Arc<dyn Gateway>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn with_retries<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(gateway = %self.inner.name(), attempt, "{what} succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !err.is_transient() {
                return Err(err);
            }
            if attempt > self.policy.max_retries {
                if self.policy.max_retries == 0 {
                    return Err(err);
                }
                return Err(GatewayError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.delay_after(attempt, &err);
            warn!(
                gateway = %self.inner.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "{what} failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Gateway for RetryingGateway {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, GatewayError> {
        self.with_retries("Completion", || self.inner.complete(request.clone()))
            .await
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<DeltaReceiver, GatewayError> {
        self.with_retries("Stream open", || self.inner.stream(request.clone()))
            .await
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, GatewayError> {
        self.with_retries("Model listing", || self.inner.list_models())
            .await
    }
}
