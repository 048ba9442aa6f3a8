use std::{future::Future, time::Duration};

use pkiwarden_types::CaError;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::PkiError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

pub(crate) enum RetryError {
    Canceled,
    Failed(CaError),
}

impl RetryError {
    /// Wraps a CA failure with the operation specific cause.
    pub(crate) fn into_pki(self, cause: fn(CaError) -> PkiError) -> PkiError {
        match self {
            RetryError::Canceled => PkiError::Canceled,
            RetryError::Failed(e) => cause(e),
        }
    }
}

/// Runs `operation` with exponential backoff until it succeeds, reports a
/// permanent error, runs out of retries or `cancel` fires.
pub(crate) async fn retry<T, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CaError>>,
{
    let mut retries = 0u32;
    let mut delay = config.initial_delay.min(config.max_delay);
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Canceled);
        }
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Canceled),
            result = operation() => result,
        };
        let e = match result {
            Ok(v) => return Ok(v),
            Err(e) if e.is_permanent() => {
                error!(operation = operation_name, "permanent error: {}", e);
                return Err(RetryError::Failed(e));
            }
            Err(e) => e,
        };
        if retries >= config.max_retries {
            error!(
                operation = operation_name,
                retries, "giving up after retries: {}", e
            );
            return Err(RetryError::Failed(e));
        }
        retries += 1;
        warn!(
            operation = operation_name,
            retry = retries,
            delay_ms = delay.as_millis() as u64,
            "retryable error: {}",
            e
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Canceled),
            _ = tokio::time::sleep(delay) => {}
        }
        delay = next_delay(config, delay);
    }
}

/// Grows `delay` by the multiplier, saturating at `max_delay`.
fn next_delay(config: &RetryConfig, delay: Duration) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * config.multiplier)
        .map_or(config.max_delay, |d| d.min(config.max_delay))
}
