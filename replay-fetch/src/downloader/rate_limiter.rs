//! Shared byte-rate limiting for segment transfers.
//!
//! A token bucket where one token is one byte. Every transfer of a job holds
//! the same [`RateLimiter`], so the limit bounds aggregate throughput rather
//! than per-connection throughput.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::{Error, Result};

/// Configuration for a rate limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Maximum tokens (burst capacity).
    pub max_tokens: u64,
    /// Tokens added per second.
    pub refill_rate: f64,
    /// Tokens available at construction.
    pub initial_tokens: u64,
}

impl RateLimiterConfig {
    /// A limit of `limit` bytes per second with one second of burst.
    ///
    /// The bucket starts empty so the first second is bounded as well.
    pub fn bytes_per_second(limit: u64) -> Result<Self> {
        if limit == 0 {
            return Err(Error::config("rate limit must be greater than zero"));
        }
        Ok(Self {
            max_tokens: limit,
            refill_rate: limit as f64,
            initial_tokens: 0,
        })
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Take `amount` tokens, or report how long until they are available.
    fn take(&mut self, amount: f64) -> std::result::Result<(), Duration> {
        self.refill();
        if self.tokens >= amount {
            self.tokens -= amount;
            Ok(())
        } else {
            let missing = amount - self.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }
}

/// Token bucket shared by all transfers of a job.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    max_tokens: u64,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let max_tokens = config.max_tokens.max(1);
        Self {
            bucket: Mutex::new(Bucket {
                tokens: config.initial_tokens.min(max_tokens) as f64,
                max_tokens: max_tokens as f64,
                refill_rate: config.refill_rate,
                last_refill: Instant::now(),
            }),
            max_tokens,
        }
    }

    /// Limiter for `limit` bytes per second.
    pub fn bytes_per_second(limit: u64) -> Result<Self> {
        Ok(Self::new(RateLimiterConfig::bytes_per_second(limit)?))
    }

    /// Take `bytes` tokens, waiting as long as needed.
    ///
    /// Requests larger than the bucket capacity are taken in capacity-sized
    /// pieces. Returns the total time spent waiting.
    ///
    /// # Cancel Safety
    ///
    /// The lock is only held for the synchronous bucket update, never across
    /// an await point. Pieces already taken when the future is dropped are
    /// not returned to the bucket.
    pub async fn acquire(&self, bytes: u64) -> Duration {
        let mut remaining = bytes;
        let mut waited = Duration::ZERO;

        while remaining > 0 {
            let piece = remaining.min(self.max_tokens);
            loop {
                let wait = match self.bucket.lock().take(piece as f64) {
                    Ok(()) => break,
                    Err(wait) => wait,
                };
                trace!(bytes = piece, ?wait, "Rate limited");
                tokio::time::sleep(wait).await;
                waited += wait;
            }
            remaining -= piece;
        }

        waited
    }
}
