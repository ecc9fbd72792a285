//! Fixed-window counter stores
//!
//! The limiter only sees [`RateLimitStore`]. [`InMemoryStore`] keeps
//! counters in process memory; a shared key-value backend implements the
//! same trait for multi-instance deployments.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rate limit store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid rate limit window: {0:?}")]
    InvalidWindow(Duration),
}

/// Result of counting one request against a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitOutcome {
    pub allowed: bool,
    /// Requests counted in the current window, including this one if allowed
    pub count: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

impl HitOutcome {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }

    /// Time until the window resets, rounded up to whole seconds
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let ms = (self.reset_at - now).num_milliseconds().max(0) as u64;
        ms.div_ceil(1000)
    }
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count a request for `key`
    ///
    /// An expired or absent window starts fresh at `now`. A full window
    /// rejects without incrementing.
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<HitOutcome, StoreError>;

    /// Drop windows that have expired by `now`, returning how many
    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Process-local store; counters are lost on restart
#[derive(Debug, Default)]
pub struct InMemoryStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently tracked
    pub fn len(&self) -> usize {
        self.windows.lock().map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RateLimitStore for InMemoryStore {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<HitOutcome, StoreError> {
        let reset_at = ChronoDuration::from_std(window)
            .ok()
            .and_then(|span| now.checked_add_signed(span))
            .ok_or(StoreError::InvalidWindow(window))?;
        let mut windows = self
            .windows
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let entry = windows.entry(key.to_string()).or_insert(Window { count: 0, reset_at });
        if entry.reset_at <= now {
            entry.count = 0;
            entry.reset_at = reset_at;
        }

        let allowed = entry.count < limit;
        if allowed {
            entry.count += 1;
        }

        Ok(HitOutcome {
            allowed,
            count: entry.count,
            limit,
            reset_at: entry.reset_at,
        })
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let before = windows.len();
        windows.retain(|_, w| w.reset_at > now);
        Ok(before - windows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    #[tokio::test]
    async fn test_window_counts_then_rejects() {
        let store = InMemoryStore::new();
        let window = Duration::from_millis(1000);

        for expected in 1..=3 {
            let outcome = store.hit("k", 3, window, at(10)).await.unwrap();
            assert!(outcome.allowed);
            assert_eq!(outcome.count, expected);
        }

        let rejected = store.hit("k", 3, window, at(20)).await.unwrap();
        assert!(!rejected.allowed);
        assert_eq!(rejected.count, 3);
        assert_eq!(rejected.remaining(), 0);
        assert_eq!(rejected.reset_at, at(1010));
        assert_eq!(rejected.retry_after_secs(at(20)), 1);
    }

    #[tokio::test]
    async fn test_expired_window_resets() {
        let store = InMemoryStore::new();
        let window = Duration::from_millis(1000);
        for _ in 0..4 {
            store.hit("k", 3, window, at(0)).await.unwrap();
        }

        let fresh = store.hit("k", 3, window, at(1000)).await.unwrap();
        assert!(fresh.allowed);
        assert_eq!(fresh.count, 1);
        assert_eq!(fresh.reset_at, at(2000));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = InMemoryStore::new();
        let window = Duration::from_secs(60);
        store.hit("a", 1, window, at(0)).await.unwrap();

        assert!(!store.hit("a", 1, window, at(1)).await.unwrap().allowed);
        assert!(store.hit("b", 1, window, at(1)).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_sweep_drops_only_expired() {
        let store = InMemoryStore::new();
        store.hit("short", 5, Duration::from_millis(100), at(0)).await.unwrap();
        store.hit("long", 5, Duration::from_secs(60), at(0)).await.unwrap();

        assert_eq!(store.sweep(at(50)).await.unwrap(), 0);
        assert_eq!(store.sweep(at(100)).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_window_is_rejected_without_poisoning() {
        let store = InMemoryStore::new();
        let huge = Duration::from_millis(9_000_000_000_000_000);

        let err = store.hit("k", 3, huge, at(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidWindow(_)));

        // The store keeps working afterwards
        let outcome = store.hit("k", 3, Duration::from_secs(1), at(0)).await.unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.count, 1);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let outcome = HitOutcome {
            allowed: false,
            count: 3,
            limit: 3,
            reset_at: at(2001),
        };
        assert_eq!(outcome.retry_after_secs(at(0)), 3);
        assert_eq!(outcome.retry_after_secs(at(1001)), 1);
        assert_eq!(outcome.retry_after_secs(at(5000)), 0);
    }
}
