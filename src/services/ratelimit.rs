use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::PosterResult;
use crate::services::RateLimiter;

/// In-process sliding-window limiter, one window per caller identity.
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        SlidingWindowLimiter {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// `max_requests` per identity per minute.
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn allow(&self, identity: &str) -> PosterResult<bool> {
        let now = Instant::now();
        let mut hits = self
            .hits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let window = hits.entry(identity.to_string()).or_default();

        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.max_requests {
            return Ok(false);
        }
        window.push_back(now);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_limit_then_denies() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.allow("1.2.3.4").await.unwrap());
        }
        assert!(!limiter.allow("1.2.3.4").await.unwrap());
    }

    #[tokio::test]
    async fn identities_are_isolated() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow("a").await.unwrap());
        assert!(limiter.allow("b").await.unwrap());
        assert!(!limiter.allow("a").await.unwrap());
    }

    #[tokio::test]
    async fn window_expiry_readmits() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.allow("a").await.unwrap());
        assert!(!limiter.allow("a").await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.allow("a").await.unwrap());
    }
}
