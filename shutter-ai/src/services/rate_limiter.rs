//! Rate limiters for outbound catalog calls
//!
//! [`FixedDelayLimiter`] enforces a minimum spacing between successive calls
//! using the monotonic clock. [`TokenBucketLimiter`] is the `governor`
//! alternative with the same one-permit-per-interval budget. Callers only see
//! the [`RateLimiter`] trait.

use async_trait::async_trait;
use governor::Quota;
use shutter_common::config::{CatalogConfig, LimiterKind};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until the next call is allowed
    async fn acquire(&self);
}

/// Minimum spacing between calls
pub struct FixedDelayLimiter {
    last_call: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl FixedDelayLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_call: Mutex::new(None),
            min_interval,
        }
    }
}

#[async_trait]
impl RateLimiter for FixedDelayLimiter {
    async fn acquire(&self) {
        // Held across the sleep so concurrent callers queue up behind each other
        let mut last = self.last_call.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Catalog rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Token bucket with a burst of one
pub struct TokenBucketLimiter {
    inner: governor::RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl TokenBucketLimiter {
    pub fn new(interval: Duration) -> Self {
        // governor rejects a zero period
        let period = interval.max(Duration::from_millis(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);

        Self {
            inner: governor::RateLimiter::direct(quota),
        }
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn acquire(&self) {
        self.inner.until_ready().await;
    }
}

/// Build the limiter selected by the `[catalog]` table
pub fn limiter_from_config(config: &CatalogConfig) -> Arc<dyn RateLimiter> {
    let interval = Duration::from_millis(config.min_interval_ms);
    match config.limiter {
        LimiterKind::Fixed => Arc::new(FixedDelayLimiter::new(interval)),
        LimiterKind::TokenBucket => Arc::new(TokenBucketLimiter::new(interval)),
    }
}
