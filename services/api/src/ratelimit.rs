//! Keyed token-bucket rate limiting for the API surface.
//!
//! One bucket per API key (or per source IP before authentication).
//! Rejections carry Retry-After; every response gets X-RateLimit headers.

use std::num::NonZeroU32;

use axum::http::HeaderMap;
use dashmap::DashMap;
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::InMemoryState,
    Quota, RateLimiter,
};

type KeyedLimiter =
    RateLimiter<String, DashMap<String, InMemoryState>, DefaultClock, NoOpMiddleware>;

/// Shared limiter state.
pub struct RateLimitState {
    limiter: KeyedLimiter,
    per_minute: u32,
}

/// Rejection details for a throttled request.
#[derive(Debug)]
pub struct Throttled {
    pub retry_after_secs: u64,
}

impl RateLimitState {
    pub fn new(per_minute: u32) -> Self {
        let quota = Quota::per_minute(
            NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::new(60).unwrap()),
        );
        Self {
            limiter: RateLimiter::dashmap(quota),
            per_minute,
        }
    }

    /// Check a request attributed to `key`; `key` is the API key when
    /// present, the source address otherwise.
    pub fn check(&self, key: &str) -> Result<(), Throttled> {
        match self.limiter.check_key(&key.to_string()) {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                Err(Throttled {
                    retry_after_secs: wait.as_secs() + 1,
                })
            }
        }
    }

    /// Standard X-RateLimit headers for a response.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = self.per_minute.to_string().parse() {
            headers.insert("X-RateLimit-Limit", value);
        }
        if let Ok(value) = "60".parse() {
            headers.insert("X-RateLimit-Window-Seconds", value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_throttled() {
        let state = RateLimitState::new(5);
        for _ in 0..5 {
            assert!(state.check("key-a").is_ok());
        }
        let throttled = state.check("key-a").unwrap_err();
        assert!(throttled.retry_after_secs >= 1);

        // Independent buckets per key
        assert!(state.check("key-b").is_ok());
    }

    #[test]
    fn test_headers_present() {
        let state = RateLimitState::new(120);
        let headers = state.headers();
        assert_eq!(headers.get("X-RateLimit-Limit").unwrap(), "120");
    }
}
