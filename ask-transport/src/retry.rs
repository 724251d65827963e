use crate::error::{Classification, Result, TransportError, classify_default};
use crate::policy::RetryPolicy;
use std::future::Future;

#[derive(Debug, Clone, Default)]
pub struct RetryTransport {
    policy: RetryPolicy,
}

impl RetryTransport {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Runs `call` under the policy using [`classify_default`].
    pub async fn execute<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with(operation, call, classify_default).await
    }

    /// Runs `call` until it succeeds, fails permanently, or the retry budget is spent.
    ///
    /// Each attempt is raced against `policy.timeout`; an elapsed timeout is
    /// reported as [`TransportError::Timeout`] and goes through `classify`
    /// like any other failure. Exhausting retries returns the last error.
    #[tracing::instrument(level = "debug", skip_all, fields(operation = operation))]
    pub async fn execute_with<T, F, Fut, C>(
        &self,
        operation: &str,
        mut call: F,
        classify: C,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&TransportError) -> Classification,
    {
        let mut retries: u32 = 0;
        loop {
            let attempt = retries + 1;
            let outcome = match tokio::time::timeout(self.policy.timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::Timeout),
            };
            let error = match outcome {
                Ok(value) => {
                    if retries > 0 {
                        tracing::info!(operation, attempt, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if classify(&error) == Classification::Permanent {
                tracing::debug!(operation, attempt, %error, "permanent failure; not retrying");
                return Err(error);
            }
            if retries >= self.policy.max_retries {
                tracing::warn!(operation, attempts = attempt, %error, "retries exhausted");
                return Err(error);
            }

            retries += 1;
            let delay = self.policy.backoff_delay(retries);
            tracing::warn!(
                operation,
                attempt = retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                %error,
                "transient failure; retrying with backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
