use crate::lms;
use async_trait::async_trait;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::warn;

/// How many times a call is attempted before giving up
pub const MAX_ATTEMPTS: u32 = 3;

/// How long to wait between attempts
pub const DELAY: Duration = Duration::from_secs(1);

/// Waits between attempts
#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Sleeps on the tokio timer. Dropping the future interrupts the sleep.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sleep;

#[async_trait]
impl Delay for Sleep {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Retries LMS calls that failed due to transport errors
///
/// Every call starts with a fresh attempt budget.
#[derive(Clone)]
pub struct Retry {
    max_attempts: u32,
    delay: Duration,
    waiter: Arc<dyn Delay>,
}

impl Retry {
    pub fn new(waiter: Arc<dyn Delay>) -> Self {
        Retry {
            max_attempts: MAX_ATTEMPTS,
            delay: DELAY,
            waiter,
        }
    }

    /// Run the call until it succeeds, fails terminally, or runs out of attempts
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> lms::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = lms::Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_attempts => {
                    warn!(operation, attempt, %error, "transient lms failure, retrying");
                    self.waiter.wait(self.delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl Default for Retry {
    fn default() -> Self {
        Retry::new(Arc::new(Sleep))
    }
}
