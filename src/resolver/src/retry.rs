//! Fixed-interval retry for the bulk refresh pipelines

use attrbridge_core::Result;
use std::future::Future;
use tracing::{debug, warn};

use crate::config::RetryPolicy;

impl RetryPolicy {
    /// Run `operation` until it succeeds, fails permanently, or the attempts
    /// run out.
    ///
    /// Sleeps for the configured interval before every retry. The last error
    /// is returned once the attempts are exhausted.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    if attempt >= self.retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            error = %error,
                            "Retries exhausted"
                        );
                        return Err(error);
                    }

                    attempt += 1;
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_retries = self.retries,
                        delay_secs = self.interval_secs,
                        error = %error,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(self.interval()).await;
                }
            }
        }
    }
}
