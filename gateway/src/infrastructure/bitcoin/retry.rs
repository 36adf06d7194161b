use std::future::Future;

use tokio::time::{sleep, Duration};

use crate::infrastructure::bitcoin::error::NodeError;
use crate::utils::logging;

/// Retries transient chain-source failures with exponential backoff
/// (250 ms, 1 s, 4 s), then gives up and lets the next scheduler tick
/// re-attempt. Fatal errors are returned immediately.
#[derive(Debug, Clone)]
pub struct RetryHandler {
    max_retries: u32,
    base_delay_ms: u64,
}

impl RetryHandler {
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 250,
        }
    }

    #[cfg(test)]
    pub fn with_config(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
        }
    }

    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, NodeError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let mut retry_count = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if retry_count > 0 {
                        logging::log_info(&format!(
                            "{} succeeded after {} retries",
                            operation_name, retry_count
                        ));
                    }
                    return Ok(result);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.max_retries {
                        logging::log_warning(&format!(
                            "{} failed after {} retries: {}",
                            operation_name, self.max_retries, e
                        ));
                        return Err(e);
                    }

                    let delay = self.calculate_delay(retry_count);
                    logging::log_warning(&format!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms",
                        operation_name, retry_count, self.max_retries, e, delay
                    ));
                    sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    /// 250ms, 1s, 4s
    fn calculate_delay(&self, retry_count: u32) -> u64 {
        self.base_delay_ms * 4_u64.pow(retry_count.saturating_sub(1))
    }
}

impl Default for RetryHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_schedule_matches_contract() {
        let handler = RetryHandler::new();
        assert_eq!(handler.calculate_delay(1), 250);
        assert_eq!(handler.calculate_delay(2), 1_000);
        assert_eq!(handler.calculate_delay(3), 4_000);
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let handler = RetryHandler::with_config(3, 1);
        let attempts = AtomicU32::new(0);
        let result = handler
            .execute("op", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(NodeError::Transient("flaky".into()))
                } else {
                    Ok(7u32)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let handler = RetryHandler::with_config(3, 1);
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = handler
            .execute("op", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::Fatal("bad auth".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let handler = RetryHandler::with_config(2, 1);
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = handler
            .execute("op", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::Transient("down".into()))
            })
            .await;
        assert!(result.is_err());
        // initial attempt + two retries
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
