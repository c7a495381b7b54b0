//! Bounded retry of transient store errors

use crate::config::RetryConfig;
use ranchvault_core::StoreError;
use tracing::warn;

/// Last error of a store call that did not succeed
#[derive(Debug)]
pub struct RetryExhausted {
    /// Attempts made, including the first
    pub attempts: usize,
    /// Error from the final attempt
    pub source: StoreError,
}

/// Run `op`, retrying transient failures with exponential backoff
///
/// Non-transient errors are returned immediately.
pub fn with_retry<T>(
    config: &RetryConfig,
    what: &str,
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, RetryExhausted> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                let delay = config.backoff(attempt);
                warn!(
                    target: "ranchvault::store",
                    what,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient store error, retrying"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                return Err(RetryExhausted {
                    attempts: attempt + 1,
                    source: e,
                })
            }
        }
    }
}
