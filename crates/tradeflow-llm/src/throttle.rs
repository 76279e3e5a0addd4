//! Request-rate throttling for generative backends

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Shared request budget for every generation of a run
///
/// Clones share one limiter, so concurrent workers wait for capacity
/// instead of tripping the provider's own limit. Waiting happens in
/// [`CallPolicy::execute`](crate::CallPolicy::execute) before the per-call
/// timeout starts.
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    quota: Quota,
}

impl RateLimit {
    pub fn new(quota: Quota) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            quota,
        }
    }

    /// Budget of `requests_per_minute` generations
    pub fn per_minute(requests_per_minute: NonZeroU32) -> Self {
        Self::new(Quota::per_minute(requests_per_minute))
    }

    /// A limit when one is configured; zero means unlimited
    pub fn from_limit(requests_per_minute: Option<u32>) -> Option<Self> {
        requests_per_minute
            .and_then(NonZeroU32::new)
            .map(Self::per_minute)
    }

    /// Wait until the budget admits one more request
    pub async fn until_ready(&self) {
        self.limiter.until_ready().await;
    }
}

impl std::fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimit")
            .field("quota", &self.quota)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_zero_or_missing_limit_is_unlimited() {
        assert!(RateLimit::from_limit(None).is_none());
        assert!(RateLimit::from_limit(Some(0)).is_none());
        assert!(RateLimit::from_limit(Some(60)).is_some());
    }

    #[tokio::test]
    async fn test_clones_share_one_budget() {
        let limit = RateLimit::new(Quota::per_second(NonZeroU32::new(2).unwrap()));
        let other = limit.clone();

        let start = Instant::now();
        limit.until_ready().await;
        other.until_ready().await;
        limit.until_ready().await;

        assert!(start.elapsed() >= Duration::from_millis(400));
    }
}
