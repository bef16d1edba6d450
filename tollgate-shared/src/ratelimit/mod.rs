/// Fixed-window rate limiting
///
/// [`RateLimiter`] counts attempts per `(action, identifier)` in a fixed
/// window that starts on the first increment and resets entirely
/// `window_seconds` later. Bursts straddling a boundary may reach up to twice
/// the nominal rate.
///
/// Every call to [`RateLimiter::check`] increments the counter, including
/// attempts that will fail later for unrelated reasons (unknown email, bad
/// password). Observers therefore cannot tell "rate limited" from "rejected"
/// by watching whether the counter advanced.
///
/// # Backends
///
/// - [`memory::MemoryCounterStore`]: process-local, `tokio::time` based
/// - [`redis::RedisCounterStore`]: `INCR` + `EXPIRE` in one Lua script
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tollgate_shared::ratelimit::{memory::MemoryCounterStore, RateLimiter};
///
/// # async fn example() -> Result<(), tollgate_shared::store::StoreError> {
/// let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()));
///
/// assert!(limiter.check("login", "203.0.113.7", 2, 60).await?);
/// assert!(limiter.check("login", "203.0.113.7", 2, 60).await?);
/// assert!(!limiter.check("login", "203.0.113.7", 2, 60).await?);
/// assert_eq!(limiter.remaining("login", "203.0.113.7", 2).await?, 0);
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::store::StoreResult;

/// Atomic counters with expiry
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increments `key` and returns the post-increment count
    ///
    /// The first increment of a window sets its expiry to `window`; later
    /// increments leave the expiry unchanged.
    async fn increment(&self, key: &str, window: Duration) -> StoreResult<u64>;

    /// Current count without incrementing; 0 when absent or expired
    async fn current(&self, key: &str) -> StoreResult<u64>;
}

/// Which identifier a rule counts against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKey {
    /// `account_id:actor`
    AccountActor,
    /// Request source IP
    SourceIp,
}

/// Rate limit attached to an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    pub action: String,
    pub limit: u64,
    pub window_seconds: u64,
    pub key: RateLimitKey,
}

impl RateLimitRule {
    pub fn new(action: &str, limit: u64, window_seconds: u64, key: RateLimitKey) -> Self {
        Self {
            action: action.to_string(),
            limit,
            window_seconds,
            key,
        }
    }
}

/// Fixed-window limiter over a [`CounterStore`]
#[derive(Clone)]
pub struct RateLimiter {
    counters: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(counters: Arc<dyn CounterStore>) -> Self {
        Self { counters }
    }

    fn key(action: &str, identifier: &str) -> String {
        format!("ratelimit:{action}:{identifier}")
    }

    /// Records an attempt; true while the post-increment count is within `limit`
    pub async fn check(
        &self,
        action: &str,
        identifier: &str,
        limit: u64,
        window_seconds: u64,
    ) -> StoreResult<bool> {
        let key = Self::key(action, identifier);
        let count = self
            .counters
            .increment(&key, Duration::from_secs(window_seconds.max(1)))
            .await?;

        let allowed = count <= limit;
        if !allowed {
            debug!(action = action, limit = limit, "Rate limit exceeded");
        }
        Ok(allowed)
    }

    /// `max(0, limit - current)`; read-only
    pub async fn remaining(&self, action: &str, identifier: &str, limit: u64) -> StoreResult<u64> {
        let current = self.counters.current(&Self::key(action, identifier)).await?;
        Ok(limit.saturating_sub(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::memory::MemoryCounterStore;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCounterStore::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_boundary_and_reset() {
        let limiter = limiter();

        for _ in 0..3 {
            assert!(limiter.check("team_invite", "a:u", 3, 60).await.unwrap());
        }
        assert!(!limiter.check("team_invite", "a:u", 3, 60).await.unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(limiter.check("team_invite", "a:u", 3, 60).await.unwrap());
        assert_eq!(limiter.remaining("team_invite", "a:u", 3).await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_is_fixed_not_sliding() {
        let limiter = limiter();

        assert!(limiter.check("login", "ip", 2, 60).await.unwrap());
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(limiter.check("login", "ip", 2, 60).await.unwrap());
        assert!(!limiter.check("login", "ip", 2, 60).await.unwrap());

        // Window started at t=0, so it resets at t=60 despite later attempts
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(limiter.check("login", "ip", 2, 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_attempts_still_count() {
        let limiter = limiter();

        assert!(limiter.check("login", "ip", 1, 60).await.unwrap());
        assert!(!limiter.check("login", "ip", 1, 60).await.unwrap());
        assert!(!limiter.check("login", "ip", 1, 60).await.unwrap());
        assert_eq!(limiter.remaining("login", "ip", 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remaining_does_not_increment() {
        let limiter = limiter();

        assert_eq!(limiter.remaining("login", "ip", 5).await.unwrap(), 5);
        assert_eq!(limiter.remaining("login", "ip", 5).await.unwrap(), 5);
        limiter.check("login", "ip", 5, 60).await.unwrap();
        assert_eq!(limiter.remaining("login", "ip", 5).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_identifiers_are_independent() {
        let limiter = limiter();

        assert!(limiter.check("login", "ip-a", 1, 60).await.unwrap());
        assert!(!limiter.check("login", "ip-a", 1, 60).await.unwrap());
        assert!(limiter.check("login", "ip-b", 1, 60).await.unwrap());
        assert!(limiter.check("team_invite", "ip-a", 1, 60).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_admit_exactly_limit() {
        let limiter = limiter();
        let mut handles = Vec::new();

        for _ in 0..50 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.check("team_invite", "a:u", 10, 60).await.unwrap()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
