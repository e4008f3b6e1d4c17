//! Global scheduler counters (§4.1 step 3, **[EXPANSION]** in `SPEC_FULL.md`).
//!
//! Flushed best-effort at the end of every tick; a storage failure here is
//! logged and swallowed rather than failing the tick (§7 "stats are flushed
//! on a best-effort basis").

use nestwatch_protocol::types::GlobalStats;
use nestwatch_storage::Store;
use tracing::warn;

/// Read-modify-write the global counters, tolerating storage failure.
pub async fn flush(store: &Store, delta: GlobalStatsDelta) {
    let mut stats = match store.get_global_stats().await {
        Ok(stats) => stats,
        Err(err) => {
            warn!(error = %err, "could not load global stats, starting from zero this flush");
            GlobalStats::default()
        }
    };
    stats.ticks += delta.ticks;
    stats.dispatched += delta.dispatched;
    stats.cache_hits += delta.cache_hits;
    stats.publish_failures += delta.publish_failures;

    if let Err(err) = store.put_global_stats(&stats).await {
        warn!(error = %err, "failed to flush global scheduler stats");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalStatsDelta {
    pub ticks: u64,
    pub dispatched: u64,
    pub cache_hits: u64,
    pub publish_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestwatch_storage::memory_backend::MemoryBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn flush_accumulates_across_calls() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        flush(
            &store,
            GlobalStatsDelta {
                ticks: 1,
                dispatched: 3,
                cache_hits: 1,
                publish_failures: 0,
            },
        )
        .await;
        flush(
            &store,
            GlobalStatsDelta {
                ticks: 1,
                dispatched: 2,
                cache_hits: 0,
                publish_failures: 1,
            },
        )
        .await;

        let stats = store.get_global_stats().await.unwrap();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.dispatched, 5);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.publish_failures, 1);
    }
}
