//! The in-memory dedup cache (§4.1 "Deduplication cache").
//!
//! One entry per cache key, tracking when it was last dispatched. This is
//! process-local by design — the spec only requires that one probe go out
//! per (cacheKey, T_DEDUP window) from *this* scheduler, not a
//! cluster-coordinated single-writer; the scheduler itself is a single
//! process (§5).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Tracks the last dispatch time per cache key and decides, on each
/// candidate dispatch, whether this tick should publish or piggyback on a
/// recent probe.
pub struct DedupCache {
    window: Duration,
    last_dispatched: Mutex<HashMap<String, Instant>>,
}

impl DedupCache {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window: Duration::from_secs(window_secs),
            last_dispatched: Mutex::new(HashMap::new()),
        }
    }

    /// Consult the cache for `cache_key`. Returns `true` (and records `now`
    /// as the dispatch time) when this key should actually be published;
    /// returns `false` when a probe for this key went out within the dedup
    /// window and the caller should instead look up the cached result.
    pub async fn should_dispatch(&self, cache_key: &str, now: Instant) -> bool {
        let mut map = self.last_dispatched.lock().await;
        match map.get(cache_key) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                map.insert(cache_key.to_string(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_dispatch_for_a_key_is_always_allowed() {
        let cache = DedupCache::new(30);
        assert!(cache.should_dispatch("ck1", Instant::now()).await);
    }

    #[tokio::test]
    async fn second_dispatch_within_window_is_suppressed() {
        let cache = DedupCache::new(30);
        let t0 = Instant::now();
        assert!(cache.should_dispatch("ck1", t0).await);
        assert!(!cache.should_dispatch("ck1", t0 + Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn dispatch_after_window_elapses_is_allowed_again() {
        let cache = DedupCache::new(30);
        let t0 = Instant::now();
        assert!(cache.should_dispatch("ck1", t0).await);
        assert!(cache.should_dispatch("ck1", t0 + Duration::from_secs(31)).await);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_interfere() {
        let cache = DedupCache::new(30);
        let t0 = Instant::now();
        assert!(cache.should_dispatch("a", t0).await);
        assert!(cache.should_dispatch("b", t0).await);
    }
}
