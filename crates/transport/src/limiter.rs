//! Token-bucket rate limiter.
//!
//! One token is replenished every `interval`, up to `burst` tokens. The
//! bucket starts full. Waiting callers sleep on the tokio clock, so tests can
//! drive it with a paused runtime.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct TokenBucket {
    interval: Duration,
    burst: u32,
    state: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    /// Start of the current replenish period. Only meaningful while the
    /// bucket is below capacity.
    refilled_at: Instant,
}

impl TokenBucket {
    /// Creates a full bucket. A `burst` of zero is treated as one.
    pub fn new(interval: Duration, burst: u32) -> Self {
        let burst = burst.max(1);
        Self {
            interval,
            burst,
            state: Mutex::new(Bucket {
                tokens: burst,
                refilled_at: Instant::now(),
            }),
        }
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Takes a token if one is available.
    ///
    /// Otherwise returns how long until the next token is replenished.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut bucket = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket, now);

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            return Ok(());
        }
        Err(self
            .interval
            .saturating_sub(now.duration_since(bucket.refilled_at)))
    }

    /// Waits until a token is available and takes it.
    ///
    /// Cancel-safe: dropping the future before it resolves spends nothing.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        if bucket.tokens >= self.burst || self.interval.is_zero() {
            bucket.tokens = self.burst;
            bucket.refilled_at = now;
            return;
        }

        let elapsed = now.duration_since(bucket.refilled_at);
        let earned = elapsed.as_nanos() / self.interval.as_nanos();
        if earned == 0 {
            return;
        }

        let missing = u128::from(self.burst - bucket.tokens);
        if earned >= missing {
            bucket.tokens = self.burst;
            bucket.refilled_at = now;
        } else {
            // earned < burst, so it fits in u32.
            let earned = earned as u32;
            bucket.tokens += earned;
            bucket.refilled_at += self.interval * earned;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn burst_is_available_immediately() {
        let bucket = TokenBucket::new(INTERVAL, 8);
        let start = Instant::now();
        for _ in 0..8 {
            bucket.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(bucket.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn drains_at_replenish_rate() {
        let bucket = TokenBucket::new(INTERVAL, 8);
        let start = Instant::now();
        for _ in 0..20 {
            bucket.acquire().await;
        }
        assert!(start.elapsed() >= INTERVAL * 12, "took {:?}", start.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_reports_wait() {
        let bucket = TokenBucket::new(INTERVAL, 1);
        assert!(bucket.try_acquire().is_ok());

        tokio::time::advance(Duration::from_millis(30)).await;
        let wait = bucket.try_acquire().unwrap_err();
        assert_eq!(wait, Duration::from_millis(70));
    }

    #[tokio::test(start_paused = true)]
    async fn refill_caps_at_burst() {
        let bucket = TokenBucket::new(INTERVAL, 3);
        for _ in 0..3 {
            bucket.try_acquire().unwrap();
        }

        tokio::time::advance(Duration::from_secs(10)).await;
        for _ in 0..3 {
            bucket.try_acquire().unwrap();
        }
        assert!(bucket.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn partial_refill_keeps_remainder() {
        let bucket = TokenBucket::new(INTERVAL, 4);
        for _ in 0..4 {
            bucket.try_acquire().unwrap();
        }

        // 2.5 intervals: two tokens, half an interval carried over.
        tokio::time::advance(Duration::from_millis(250)).await;
        bucket.try_acquire().unwrap();
        bucket.try_acquire().unwrap();
        assert_eq!(bucket.try_acquire().unwrap_err(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn zero_burst_is_clamped() {
        let bucket = TokenBucket::new(INTERVAL, 0);
        assert_eq!(bucket.burst(), 1);
        assert!(bucket.try_acquire().is_ok());
    }
}
