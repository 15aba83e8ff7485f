use std::time::Duration;

use verifai_common::config::RetryConfig;

/// Exponential backoff schedule driven by a `RetryConfig`.
///
/// Call `next_delay` after each failed attempt; it returns `None` once the
/// attempt budget is spent.
pub struct Backoff<'a> {
    config: &'a RetryConfig,
    attempt: u32,
    backoff_ms: u64,
}

impl<'a> Backoff<'a> {
    pub fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            attempt: 0,
            backoff_ms: config.initial_backoff_ms,
        }
    }

    /// Number of attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Record a failed attempt and return how long to wait before the next one.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.config.max_attempts {
            return None;
        }

        let jitter = if self.config.jitter {
            compute_jitter(self.attempt, self.backoff_ms)
        } else {
            0
        };
        let wait = self.backoff_ms + jitter;

        self.backoff_ms = (self.backoff_ms as f64 * self.config.backoff_multiplier) as u64;
        self.backoff_ms = self.backoff_ms.min(self.config.max_backoff_ms);

        Some(Duration::from_millis(wait))
    }
}

/// Run `op` until it succeeds, the error is not retryable, or attempts run out.
pub async fn retry_async<T, E, F, Fut>(
    config: &RetryConfig,
    target: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut backoff = Backoff::new(config);

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => match backoff.next_delay() {
                Some(wait) => {
                    tracing::warn!(
                        target_name = target,
                        attempt = backoff.attempts(),
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Call failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                None => return Err(e),
            },
        }
    }
}

/// Compute jitter for retry backoff using simple hash-based approach.
fn compute_jitter(attempt: u32, backoff_ms: u64) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::hash::DefaultHasher::new();
    attempt.hash(&mut hasher);
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos()
        .hash(&mut hasher);
    hasher.finish() % (backoff_ms / 2 + 1)
}
