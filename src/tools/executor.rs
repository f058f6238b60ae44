//! Retrying invocation with timeouts
//!
//! Information Hiding:
//! - Retry strategy implementation hidden
//! - Backoff algorithm hidden
//! - Error classification delegated to `ToolServiceError::is_transient`

use super::{Arguments, ToolInvocationResult, ToolInvocationService};
use crate::error::ToolServiceError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};

/// Timeout and retry policy for remote calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryPolicy {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Self {
        Self {
            timeout_secs,
            max_retries: max_retries.max(1),
            ..Self::default()
        }
    }

    /// Exponential backoff delay before `attempt` (1-based retry index)
    fn backoff(&self, attempt: u32) -> u64 {
        let delay = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
        delay.min(self.max_delay_ms)
    }
}

/// Wraps a service so every call is time-boxed and transient failures are retried.
pub struct RetryingService {
    inner: Arc<dyn ToolInvocationService>,
    policy: RetryPolicy,
}

impl RetryingService {
    pub fn new(inner: Arc<dyn ToolInvocationService>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ToolInvocationService for RetryingService {
    async fn invoke(
        &self,
        name: &str,
        arguments: &Arguments,
    ) -> Result<ToolInvocationResult, ToolServiceError> {
        let mut last_error = None;
        let attempts = self.policy.max_retries.max(1);

        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff_ms = self.policy.backoff(attempt);
                tracing::warn!(
                    "Retrying tool '{}' (attempt {}/{}) after {}ms",
                    name,
                    attempt + 1,
                    attempts,
                    backoff_ms
                );
                sleep(Duration::from_millis(backoff_ms)).await;
            }

            let call = self.inner.invoke(name, arguments);
            let outcome = match timeout(Duration::from_secs(self.policy.timeout_secs), call).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ToolServiceError::Timeout {
                    tool: name.to_string(),
                    secs: self.policy.timeout_secs,
                }),
            };

            match outcome {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() => {
                    tracing::warn!("Tool '{}' attempt {} failed: {}", name, attempt + 1, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ToolServiceError::RetriesExhausted {
            tool: name.to_string(),
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}
