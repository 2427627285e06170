//! Shared retry policy
//!
//! One loop for every agent: validation failures return immediately,
//! transient failures back off exponentially, unknown failures surface once.

use crate::error::{ErrorCode, OrchestrationError};
use crate::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based):
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let code = err.code();
            if !code.is_retryable() {
                return Err(err);
            }

            if attempt >= max_attempts {
                return Err(OrchestrationError::agent(
                    code,
                    format!("{} failed after {} attempts: {}", operation, attempt, err),
                ));
            }

            let delay = self.delay_for(attempt);
            warn!(
                operation,
                attempt,
                max_attempts,
                code = %code,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// True when a failure should be surfaced to the caller as bad input
/// rather than an infrastructure problem.
pub fn is_validation_code(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::EmptyQuery
            | ErrorCode::EmptyResponse
            | ErrorCode::InvalidResponse
            | ErrorCode::InvalidCategory
            | ErrorCode::InvalidConfidence
            | ErrorCode::InvalidStatus
            | ErrorCode::LowConfidence
            | ErrorCode::LowConfidenceValidation
            | ErrorCode::ExtractionParseError
            | ErrorCode::ValidationError
    )
}
