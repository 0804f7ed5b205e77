//! Token accounting for the dispatcher: one global bucket bounds the whole
//! scan's request rate, one optional per-target bucket enforces a minimum
//! gap between consecutive requests to the same host.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

pub type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Builds the scan-wide limiter. Burst is pinned to one token so the
/// observed request count in any window stays within rate * seconds + 1.
pub fn global_limiter(max_rate: u32) -> Option<Arc<DirectLimiter>> {
    let rate = NonZeroU32::new(max_rate)?;
    let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);
    Some(Arc::new(RateLimiter::direct(quota)))
}

fn delay_limiter(delay: Duration) -> Option<DirectLimiter> {
    if delay.is_zero() {
        return None;
    }
    Quota::with_period(delay)
        .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)))
}

/// Per-target acquisition point. Workers block here before every request.
pub struct RateGate {
    global: Option<Arc<DirectLimiter>>,
    per_target: Option<DirectLimiter>,
}

impl RateGate {
    pub fn new(global: Option<Arc<DirectLimiter>>, delay: Duration) -> Self {
        Self {
            global,
            per_target: delay_limiter(delay),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            global: None,
            per_target: None,
        }
    }

    pub async fn acquire(&self) {
        if let Some(global) = self.global.as_ref() {
            global.until_ready().await;
        }
        if let Some(per_target) = self.per_target.as_ref() {
            per_target.until_ready().await;
        }
    }
}
