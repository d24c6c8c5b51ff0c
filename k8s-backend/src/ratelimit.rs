// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Client-side rate limiting of API server requests.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Token bucket shared by every resource client built from one client set.
///
/// The bucket holds up to `burst` tokens and refills at `qps` tokens per second. A request
/// that finds the bucket empty reserves a future token and waits until it is due, so
/// concurrent callers are served in reservation order.
#[derive(Debug)]
pub struct RateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Build a limiter. A non-positive `qps` disables the refill delay entirely.
    #[must_use]
    pub fn new(qps: f32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            qps: f64::from(qps),
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn qps(&self) -> f64 {
        self.qps
    }

    #[must_use]
    pub fn burst(&self) -> f64 {
        self.burst
    }

    /// Take one token and return how long the caller has to wait before using it.
    fn reserve(&self) -> Duration {
        if self.qps <= 0.0 {
            return Duration::ZERO;
        }
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
        bucket.last = now;
        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.qps)
        }
    }

    /// Wait until a request may be sent.
    pub async fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            trace!("Client-side throttling: waiting {wait:?}");
            tokio::time::sleep(wait).await;
        }
    }
}
