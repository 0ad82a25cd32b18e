//! Byte-rate limiter used to throttle blob and remote I/O.
//!
//! A token bucket refilled continuously at the configured rate. Requests
//! may overdraw the bucket; the overdraft is paid back by sleeping, so a
//! single oversized request is admitted rather than rejected.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Token-bucket byte-rate limiter. Shared across threads by reference.
pub struct RateLimiter {
    /// Refill rate in bytes per second.
    rate_per_sec: u64,

    state: Mutex<BucketState>,
}

struct BucketState {
    /// Available tokens in bytes; may go negative (overdraft).
    available: i64,

    /// Last refill time.
    last_refill: Instant,
}

impl RateLimiter {
    /// Creates a limiter admitting `rate_per_sec` bytes per second with a
    /// burst of one second's worth of tokens.
    pub fn new(rate_per_sec: u64) -> Self {
        Self {
            rate_per_sec: rate_per_sec.max(1),
            state: Mutex::new(BucketState {
                available: rate_per_sec.min(i64::MAX as u64) as i64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Requests `bytes` of budget, sleeping until the bucket allows it.
    pub fn request(&self, bytes: u64) {
        let wait = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let elapsed = now.duration_since(state.last_refill);
            let refill = (elapsed.as_secs_f64() * self.rate_per_sec as f64) as i64;
            state.available = (state.available.saturating_add(refill))
                .min(self.rate_per_sec.min(i64::MAX as u64) as i64);
            state.last_refill = now;

            state.available = state
                .available
                .saturating_sub(bytes.min(i64::MAX as u64) as i64);
            if state.available >= 0 {
                None
            } else {
                let deficit = (-state.available) as f64;
                Some(Duration::from_secs_f64(deficit / self.rate_per_sec as f64))
            }
        };
        if let Some(wait) = wait {
            std::thread::sleep(wait);
        }
    }
}

/// Requests budget through an optional limiter.
pub(crate) fn maybe_request(limiter: Option<&RateLimiter>, bytes: u64) {
    if let Some(limiter) = limiter {
        limiter.request(bytes);
    }
}
