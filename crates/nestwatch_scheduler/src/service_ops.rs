//! `monitor_service` / `stop_monitoring` command handling (§4.1).
//!
//! These are the two control-plane commands the admin collaborator (out of
//! scope here) publishes to add or remove a service from the scheduler's
//! working set. Re-adding a service id that is already scheduled preserves
//! its accumulated stats rather than resetting them — §4.1's idempotence
//! requirement.

use chrono::Utc;
use nestwatch_protocol::cache_key;
use nestwatch_protocol::types::{ScheduledService, Service};
use nestwatch_storage::Store;
use tracing::info;

use crate::error::Result;

/// Start (or resume) scheduling `service`. If it is already scheduled, the
/// existing record is kept and only its embedded `Service` definition and
/// cache key are refreshed, so in-flight stats survive a duplicate
/// `monitor_service` delivery.
pub async fn monitor_service(store: &Store, service: Service) -> Result<()> {
    let key = cache_key::cache_key(&service.target, &service.config);

    match store.get_scheduled_service(&service.id).await? {
        Some(mut existing) => {
            existing.cache_key = key;
            existing.service = service;
            store.put_scheduled_service(&existing).await?;
            info!(service_id = %existing.service.id, "service re-added, stats preserved");
        }
        None => {
            let scheduled = ScheduledService::new(service, key, Utc::now());
            info!(service_id = %scheduled.service.id, "service added to scheduler");
            store.put_scheduled_service(&scheduled).await?;
        }
    }
    Ok(())
}

/// Remove a service from the scheduler's working set. Dropping an unknown
/// id is not an error (§4.1: the command is a set-membership operation).
pub async fn stop_monitoring(store: &Store, service_id: &str) -> Result<()> {
    store.remove_scheduled_service(service_id).await?;
    info!(service_id, "service removed from scheduler");
    Ok(())
}
