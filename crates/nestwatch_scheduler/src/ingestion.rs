//! Result ingestion (§4.1 "Result ingestion", §4.4 live fan-out).
//!
//! A probe result arrives tagged with the `cache_key` it was dispatched
//! under (or none, for the rare direct single-service case). Every
//! scheduled service sharing that cache key gets its rolling stats updated
//! and a live-status event published, not just the service the worker
//! happened to name.

use chrono::Utc;
use nestwatch_protocol::types::{ProbeResult, ProbeResultMessage, ProbeStatus, SseEvent};
use nestwatch_storage::Store;
use tracing::{debug, warn};

use crate::error::Result;

/// Accept one inbound probe result: cache it (if it carries a cache key),
/// fan the outcome out to every scheduled service that shares the key, and
/// publish a live-status event per updated service.
pub async fn ingest_result(store: &Store, msg: ProbeResultMessage) -> Result<usize> {
    let cache_key = msg.cache_key.clone();
    let result: ProbeResult = msg.clone().into();

    if let Some(ref key) = cache_key {
        store
            .put_cached_result(key, &result, nestwatch_protocol::defaults::DEFAULT_DEDUP_TTL_SECS)
            .await?;
    }

    let targets = match &cache_key {
        Some(key) => services_sharing_cache_key(store, key).await?,
        None => match store.get_scheduled_service(&msg.service_id).await? {
            Some(s) => vec![s],
            None => Vec::new(),
        },
    };

    if targets.is_empty() {
        debug!(service_id = %msg.service_id, "result for a service no longer scheduled, dropping");
        return Ok(0);
    }

    let mut updated = 0;
    for mut scheduled in targets {
        scheduled.apply_result(result.status, result.response_time_ms, result.timestamp);
        scheduled.last_check_at = Some(result.timestamp);
        store.put_scheduled_service(&scheduled).await?;

        let event = SseEvent::ServiceUpdate {
            service_id: scheduled.service.id.clone(),
            status: result.status,
            response_time: result.response_time_ms,
            timestamp: result.timestamp.timestamp_millis(),
        };
        if let Err(err) = store.publish_sse(&scheduled.service.nest_id, &event).await {
            warn!(service_id = %scheduled.service.id, error = %err, "failed to publish live status event");
        }
        updated += 1;
    }

    Ok(updated)
}

/// All currently scheduled services whose fingerprint matches `cache_key`.
///
/// `Store` only indexes scheduled services by id, so this scans the full
/// set; acceptable at the scale a single scheduler process serves (§5).
async fn services_sharing_cache_key(
    store: &Store,
    cache_key: &str,
) -> Result<Vec<nestwatch_protocol::types::ScheduledService>> {
    let all = store.list_scheduled_services().await?;
    Ok(all
        .into_iter()
        .filter(|s| s.cache_key == cache_key)
        .collect())
}

/// `true` when a status transition between two consecutive results should
/// be treated as the start/end of an incident (§3 Incident — up/down edge).
pub fn is_status_transition(previous: Option<ProbeStatus>, current: ProbeStatus) -> bool {
    match previous {
        Some(prev) => prev != current,
        None => current != ProbeStatus::Up,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestwatch_protocol::types::{
        RegionSelection, ScheduledService, Service, ServiceConfig,
    };
    use nestwatch_storage::memory_backend::MemoryBackend;
    use std::sync::Arc;

    fn service(id: &str, nest_id: &str) -> Service {
        Service {
            id: id.into(),
            nest_id: nest_id.into(),
            name: "test".into(),
            target: "https://example.com".into(),
            interval_secs: 30,
            config: ServiceConfig::Ping,
            regions: RegionSelection::default(),
            notification_sinks: vec![],
            active: true,
            created_at: Utc::now(),
        }
    }

    fn message(service_id: &str, cache_key: Option<&str>) -> ProbeResultMessage {
        ProbeResultMessage {
            service_id: service_id.into(),
            nest_id: "n1".into(),
            cache_key: cache_key.map(String::from),
            worker_id: "w1".into(),
            region: "us-east-1".into(),
            status: ProbeStatus::Up,
            response_time: Some(123),
            error: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    #[tokio::test]
    async fn result_with_no_cache_key_updates_only_the_named_service() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let scheduled = ScheduledService::new(service("s1", "n1"), "ck1".into(), Utc::now());
        store.put_scheduled_service(&scheduled).await.unwrap();

        let updated = ingest_result(&store, message("s1", None)).await.unwrap();
        assert_eq!(updated, 1);

        let after = store.get_scheduled_service("s1").await.unwrap().unwrap();
        assert_eq!(after.completed, 1);
    }

    #[tokio::test]
    async fn result_with_shared_cache_key_fans_out_to_every_matching_service() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let a = ScheduledService::new(service("s1", "n1"), "shared".into(), Utc::now());
        let b = ScheduledService::new(service("s2", "n2"), "shared".into(), Utc::now());
        store.put_scheduled_service(&a).await.unwrap();
        store.put_scheduled_service(&b).await.unwrap();

        let updated = ingest_result(&store, message("s1", Some("shared")))
            .await
            .unwrap();
        assert_eq!(updated, 2);

        assert_eq!(store.get_scheduled_service("s1").await.unwrap().unwrap().completed, 1);
        assert_eq!(store.get_scheduled_service("s2").await.unwrap().unwrap().completed, 1);
    }

    #[tokio::test]
    async fn result_for_an_unscheduled_service_is_dropped_without_error() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let updated = ingest_result(&store, message("ghost", None)).await.unwrap();
        assert_eq!(updated, 0);
    }

    #[test]
    fn first_ever_result_down_is_a_transition() {
        assert!(is_status_transition(None, ProbeStatus::Down));
        assert!(!is_status_transition(None, ProbeStatus::Up));
    }

    #[test]
    fn status_change_between_results_is_a_transition() {
        assert!(is_status_transition(Some(ProbeStatus::Up), ProbeStatus::Down));
        assert!(!is_status_transition(Some(ProbeStatus::Up), ProbeStatus::Up));
    }
}
