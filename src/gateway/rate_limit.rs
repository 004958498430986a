//! Token-bucket rate limiting per upstream provider.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }
}

/// One bucket per provider, shared across all callers of that provider.
pub struct TokenBucketLimiter {
    bucket: Mutex<Bucket>,
}

impl TokenBucketLimiter {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: capacity as f64,
                capacity: capacity as f64,
                refill_per_sec,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Attempts to take one token. Returns `Ok(())` if allowed, else the
    /// estimated wait before a token becomes available.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock();
        bucket.refill();

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            let wait_secs = deficit / bucket.refill_per_sec.max(f64::MIN_POSITIVE);
            Err(Duration::from_secs_f64(wait_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_burst_up_to_capacity() {
        let limiter = TokenBucketLimiter::new(3, 1.0);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());
    }

    #[test]
    fn refills_over_time() {
        let limiter = TokenBucketLimiter::new(1, 1000.0);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());
        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.try_acquire().is_ok());
    }
}
