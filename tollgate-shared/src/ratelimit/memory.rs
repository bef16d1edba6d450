/// Process-local counters
///
/// Each increment runs under one mutex guard, so read-modify-write is atomic
/// across tasks. Expiry uses `tokio::time::Instant` and follows a paused test
/// clock.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::CounterStore;
use crate::store::StoreResult;

#[derive(Debug)]
struct Window {
    count: u64,
    expires_at: Instant,
}

/// In-memory [`CounterStore`]
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> StoreResult<u64> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        // Drop stale windows so the map does not grow without bound
        windows.retain(|_, w| w.expires_at > now);

        let entry = windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            expires_at: now + window,
        });
        entry.count += 1;

        Ok(entry.count)
    }

    async fn current(&self, key: &str) -> StoreResult<u64> {
        let now = Instant::now();
        let windows = self.windows.lock().await;

        Ok(windows
            .get(key)
            .filter(|w| w.expires_at > now)
            .map(|w| w.count)
            .unwrap_or(0))
    }
}
