use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Per-domain rate limiter using a token bucket.
pub struct DomainRateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    rate: f64,
}

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    last_refill: Instant,
    rate: f64,
}

impl TokenBucket {
    fn new(rate: f64) -> Self {
        // Sub-1/s rates still allow an immediate first request.
        let capacity = (rate * 2.0).max(1.0);
        Self {
            tokens: rate.max(1.0).min(capacity),
            capacity,
            last_refill: Instant::now(),
            rate,
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = Instant::now();
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.rate)
        }
    }
}

impl DomainRateLimiter {
    /// `rate` is requests per second per domain.
    pub fn new(rate: f64) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rate,
        }
    }

    /// Wait for a permit for `domain`, giving up once `timeout` would be exceeded.
    pub async fn acquire(&self, domain: &str, timeout: Duration) -> Result<(), Duration> {
        let deadline = Instant::now() + timeout;

        loop {
            let wait_time = {
                let mut buckets = self.buckets.lock().await;
                let bucket = buckets
                    .entry(domain.to_string())
                    .or_insert_with(|| TokenBucket::new(self.rate));

                if bucket.try_acquire() {
                    return Ok(());
                }

                bucket.time_until_available()
            };

            if Instant::now() + wait_time > deadline {
                metrics::counter!("fetch.rate_limit.rejected").increment(1);
                return Err(wait_time);
            }

            tokio::time::sleep(wait_time).await;
        }
    }
}
