//! Message-bus consumers.
//!
//! A [`KafkaConsumer`] feeds each message to a [`MessageHandler`], retrying
//! retryable failures in-process and dead-lettering what still fails.

mod handlers;
mod kafka_consumer;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::ReindexConfig;
use crate::errors::ReindexError;

pub use handlers::{RangeIndexHandler, RecordsHandler};
pub use kafka_consumer::KafkaConsumer;

/// Processes the payload of one message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, payload: &[u8]) -> Result<(), ReindexError>;

    /// Runs once when a message is given up on.
    async fn on_retries_exhausted(&self, _payload: &[u8], _error: &ReindexError) {}
}

/// Fixed-delay redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first delivery.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl From<&ReindexConfig> for RetryPolicy {
    fn from(config: &ReindexConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_delay)
    }
}

/// Deliver `payload` to `handler` until it succeeds, fails permanently or
/// runs out of attempts.
pub async fn deliver_with_retry(
    handler: &dyn MessageHandler,
    payload: &[u8],
    policy: &RetryPolicy,
) -> Result<(), ReindexError> {
    let mut attempt = 1;

    loop {
        match handler.handle(payload).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                warn!(
                    handler = handler.name(),
                    attempt = attempt,
                    error = %e,
                    "Message processing failed, redelivering"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyHandler {
        calls: AtomicU32,
        failures: u32,
        retryable: bool,
    }

    #[async_trait]
    impl MessageHandler for FlakyHandler {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn handle(&self, _payload: &[u8]) -> Result<(), ReindexError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                if self.retryable {
                    return Err(ReindexError::integration("unavailable"));
                }
                return Err(ReindexError::parse("bad payload"));
            }
            Ok(())
        }
    }

    fn handler(failures: u32, retryable: bool) -> FlakyHandler {
        FlakyHandler {
            calls: AtomicU32::new(0),
            failures,
            retryable,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let handler = handler(2, true);
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        deliver_with_retry(&handler, b"{}", &policy).await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let handler = handler(5, true);
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        let result = deliver_with_retry(&handler, b"{}", &policy).await;

        assert!(matches!(result, Err(ReindexError::IntegrationError(_))));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let handler = handler(1, false);
        let policy = RetryPolicy::new(3, Duration::from_secs(60));

        let result = deliver_with_retry(&handler, b"{}", &policy).await;

        assert!(matches!(result, Err(ReindexError::ParseError(_))));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_has_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
