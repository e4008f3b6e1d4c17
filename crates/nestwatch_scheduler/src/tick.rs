//! The single-threaded scheduling tick (§4.1 "Tick", §5 concurrency model).
//!
//! One tick: list scheduled services due for a check, walk them high
//! priority first, dedup-check, route by region, publish, and persist the
//! new `next_check_at`. Ticks never overlap — the caller (the binary's
//! timer loop) awaits one tick to finish before scheduling the next.

use std::time::Instant;

use chrono::{DateTime, Utc};
use nestwatch_protocol::types::{Priority, ScheduledService};
use nestwatch_storage::Store;
use tracing::{debug, warn};

use crate::dedup::DedupCache;
use crate::error::Result;
use crate::publisher::CommandPublisher;
use crate::region;
use crate::stats::GlobalStatsDelta;

/// Outcome of a single tick, surfaced for tests and for the stats flush.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub dispatched: usize,
    pub cache_hits: usize,
    pub publish_failures: usize,
}

impl From<&TickReport> for GlobalStatsDelta {
    fn from(report: &TickReport) -> Self {
        GlobalStatsDelta {
            ticks: 1,
            dispatched: report.dispatched as u64,
            cache_hits: report.cache_hits as u64,
            publish_failures: report.publish_failures as u64,
        }
    }
}

/// Run one tick against `now`. Dispatches every due service in priority
/// order (high, then normal, then low; stable within a priority, so two
/// services at the same priority dispatch in the order storage returned
/// them — an acceptable simplification since `ScheduledService` carries no
/// separate insertion-sequence field).
pub async fn run_tick(
    store: &Store,
    dedup: &DedupCache,
    publisher: &dyn CommandPublisher,
    now: DateTime<Utc>,
) -> Result<TickReport> {
    let mut due: Vec<ScheduledService> = store
        .list_scheduled_services()
        .await?
        .into_iter()
        .filter(|s| s.service.active && s.next_check_at <= now)
        .collect();

    due.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut report = TickReport {
        due: due.len(),
        ..Default::default()
    };

    let tick_instant = Instant::now();
    for mut scheduled in due {
        let routing_keys = region::routing_keys(&scheduled.service);
        let should_dispatch = dedup.should_dispatch(&scheduled.cache_key, tick_instant).await;

        if should_dispatch {
            let command = build_command(&scheduled, now);
            for routing_key in &routing_keys {
                match publisher.publish(routing_key, &command).await {
                    Ok(()) => report.dispatched += 1,
                    Err(err) => {
                        warn!(
                            service_id = %scheduled.service.id,
                            routing_key,
                            error = %err,
                            "failed to publish probe command"
                        );
                        report.publish_failures += 1;
                    }
                }
            }
        } else {
            report.cache_hits += 1;
            debug!(service_id = %scheduled.service.id, cache_key = %scheduled.cache_key, "dedup hit, skipping dispatch");
        }

        scheduled.scheduled += 1;
        scheduled.next_check_at = now + chrono::Duration::seconds(scheduled.service.interval_secs as i64);
        store.put_scheduled_service(&scheduled).await?;
    }

    Ok(report)
}

fn build_command(
    scheduled: &ScheduledService,
    now: DateTime<Utc>,
) -> nestwatch_protocol::types::ProbeCommand {
    use nestwatch_protocol::types::ProbeCommandData;

    let data = ProbeCommandData {
        service_id: scheduled.service.id.clone(),
        nest_id: scheduled.service.nest_id.clone(),
        service_type: scheduled.service.service_type(),
        target: scheduled.service.target.clone(),
        config: scheduled.service.config.clone(),
        regions: scheduled.service.regions.regions.clone(),
        cache_key: scheduled.cache_key.clone(),
    };
    nestwatch_protocol::types::ProbeCommand::new(data, now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::RecordingPublisher;
    use nestwatch_protocol::types::{RegionSelection, RegionStrategy, Service, ServiceConfig};
    use nestwatch_storage::memory_backend::MemoryBackend;
    use std::sync::Arc;

    fn service_due_now(id: &str, regions: Vec<&str>) -> ScheduledService {
        let service = Service {
            id: id.into(),
            nest_id: "n1".into(),
            name: "test".into(),
            target: "https://example.com".into(),
            interval_secs: 30,
            config: ServiceConfig::Ping,
            regions: RegionSelection {
                regions: regions.into_iter().map(String::from).collect(),
                strategy: RegionStrategy::AllSelected,
                min_regions: 1,
                max_regions: 2,
            },
            notification_sinks: vec![],
            active: true,
            created_at: Utc::now(),
        };
        ScheduledService::new(service, format!("ck-{id}"), Utc::now() - chrono::Duration::seconds(60))
    }

    #[tokio::test]
    async fn due_service_with_no_region_dispatches_once() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let scheduled = service_due_now("s1", vec![]);
        store.put_scheduled_service(&scheduled).await.unwrap();

        let dedup = DedupCache::new(30);
        let publisher = RecordingPublisher::new();
        let report = run_tick(&store, &dedup, &publisher, Utc::now()).await.unwrap();

        assert_eq!(report.dispatched, 1);
        assert_eq!(publisher.published.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn due_service_with_two_regions_dispatches_twice() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let scheduled = service_due_now("s1", vec!["us-east-1", "eu-west-1"]);
        store.put_scheduled_service(&scheduled).await.unwrap();

        let dedup = DedupCache::new(30);
        let publisher = RecordingPublisher::new();
        let report = run_tick(&store, &dedup, &publisher, Utc::now()).await.unwrap();

        assert_eq!(report.dispatched, 2);
        let published = publisher.published.lock().await;
        assert_eq!(published[0].0, "check_service_once.us-east-1");
        assert_eq!(published[1].0, "check_service_once.eu-west-1");
    }

    #[tokio::test]
    async fn service_not_yet_due_is_skipped() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let mut scheduled = service_due_now("s1", vec![]);
        scheduled.next_check_at = Utc::now() + chrono::Duration::seconds(60);
        store.put_scheduled_service(&scheduled).await.unwrap();

        let dedup = DedupCache::new(30);
        let publisher = RecordingPublisher::new();
        let report = run_tick(&store, &dedup, &publisher, Utc::now()).await.unwrap();

        assert_eq!(report.due, 0);
        assert_eq!(report.dispatched, 0);
    }

    #[tokio::test]
    async fn inactive_service_is_never_dispatched() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let mut scheduled = service_due_now("s1", vec![]);
        scheduled.service.active = false;
        store.put_scheduled_service(&scheduled).await.unwrap();

        let dedup = DedupCache::new(30);
        let publisher = RecordingPublisher::new();
        let report = run_tick(&store, &dedup, &publisher, Utc::now()).await.unwrap();
        assert_eq!(report.due, 0);
    }

    #[tokio::test]
    async fn high_priority_services_dispatch_before_normal() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let mut normal = service_due_now("normal", vec![]);
        normal.priority = Priority::Normal;
        let mut high = service_due_now("high", vec![]);
        high.priority = Priority::High;
        store.put_scheduled_service(&normal).await.unwrap();
        store.put_scheduled_service(&high).await.unwrap();

        let dedup = DedupCache::new(30);
        let publisher = RecordingPublisher::new();
        run_tick(&store, &dedup, &publisher, Utc::now()).await.unwrap();

        let published = publisher.published.lock().await;
        assert_eq!(published[0].1.data.service_id, "high");
        assert_eq!(published[1].1.data.service_id, "normal");
    }

    #[tokio::test]
    async fn next_check_at_advances_by_the_service_interval() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let scheduled = service_due_now("s1", vec![]);
        store.put_scheduled_service(&scheduled).await.unwrap();

        let dedup = DedupCache::new(30);
        let publisher = RecordingPublisher::new();
        let now = Utc::now();
        run_tick(&store, &dedup, &publisher, now).await.unwrap();

        let after = store.get_scheduled_service("s1").await.unwrap().unwrap();
        assert_eq!(after.next_check_at, now + chrono::Duration::seconds(30));
        assert_eq!(after.scheduled, 1);
    }
}
