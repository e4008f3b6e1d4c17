//! Tenant-scoped facade over [`StorageBackend`] (§4.5).
//!
//! Every read that resolves an entity by id re-checks the `nest_id` the
//! caller asked for against the `nest_id` recorded on the stored record,
//! and returns `StorageError::CrossTenant` on mismatch rather than the
//! record itself — the one invariant this layer exists to enforce.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nestwatch_protocol::keys;
use nestwatch_protocol::types::*;

use crate::backend::StorageBackend;
use crate::error::{Result, StorageError};

#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn StorageBackend>,
}

impl Store {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn is_degraded(&self) -> bool {
        self.backend.is_degraded()
    }

    /// Escape hatch to the raw backend for callers (rate limiting, ad hoc
    /// indexes) that need an operation the typed facade doesn't cover.
    pub fn backend_ref(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    // -- Nests --------------------------------------------------------

    pub async fn get_nest(&self, nest_id: &str) -> Result<Option<Nest>> {
        get_json(&self.backend, &keys::nest(nest_id)).await
    }

    pub async fn put_nest(&self, nest: &Nest) -> Result<()> {
        set_json(&self.backend, &keys::nest(&nest.id), nest).await?;
        self.backend
            .set(&keys::nest_by_subdomain(&nest.subdomain), &nest.id)
            .await
    }

    pub async fn get_nest_by_subdomain(&self, subdomain: &str) -> Result<Option<Nest>> {
        match self.backend.get(&keys::nest_by_subdomain(subdomain)).await? {
            Some(nest_id) => self.get_nest(&nest_id).await,
            None => Ok(None),
        }
    }

    // -- Services -------------------------------------------------------

    pub async fn get_service(&self, nest_id: &str, service_id: &str) -> Result<Option<Service>> {
        let Some(service) = get_json::<Service>(&self.backend, &keys::service(service_id)).await? else {
            return Ok(None);
        };
        if service.nest_id != nest_id {
            return Err(StorageError::CrossTenant {
                nest_id: nest_id.to_string(),
                record_id: service_id.to_string(),
            });
        }
        Ok(Some(service))
    }

    pub async fn put_service(&self, service: &Service) -> Result<()> {
        set_json(&self.backend, &keys::service(&service.id), service).await?;
        self.backend
            .sadd(&keys::nest_services(&service.nest_id), &service.id)
            .await
    }

    pub async fn list_service_ids_for_nest(&self, nest_id: &str) -> Result<Vec<String>> {
        self.backend.smembers(&keys::nest_services(nest_id)).await
    }

    /// All services owned by `nest_id`, resolved via the secondary index
    /// (§4.5 design notes) rather than a `service:*` scan.
    pub async fn list_services_for_nest(&self, nest_id: &str) -> Result<Vec<Service>> {
        let mut services = Vec::new();
        for id in self.list_service_ids_for_nest(nest_id).await? {
            if let Some(service) = get_json::<Service>(&self.backend, &keys::service(&id)).await? {
                services.push(service);
            }
        }
        Ok(services)
    }

    /// Create a new active service, enforcing the per-tier quota invariant
    /// (§3 "count(services where nestId=N and active) ≤ quota(tier)").
    /// Re-creating a service id that already exists does not double-count
    /// against the quota.
    pub async fn create_service(&self, service: &Service) -> Result<()> {
        if service.active {
            let nest = self
                .get_nest(&service.nest_id)
                .await?
                .ok_or_else(|| StorageError::NotFound(service.nest_id.clone()))?;
            let existing = self.list_services_for_nest(&service.nest_id).await?;
            let active_count = existing
                .iter()
                .filter(|s| s.active && s.id != service.id)
                .count() as u32;
            if active_count + 1 > nest.tier.quota() {
                return Err(StorageError::QuotaExceeded {
                    nest_id: service.nest_id.clone(),
                    quota: nest.tier.quota(),
                });
            }
        }
        self.put_service(service).await
    }

    // -- Scheduled services (scheduler-owned) ----------------------------

    pub async fn get_scheduled_service(&self, service_id: &str) -> Result<Option<ScheduledService>> {
        match self.backend.hget(keys::SCHEDULER_SERVICES, service_id).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put_scheduled_service(&self, scheduled: &ScheduledService) -> Result<()> {
        let raw = serde_json::to_string(scheduled)?;
        self.backend
            .hset(keys::SCHEDULER_SERVICES, &scheduled.service.id, &raw)
            .await
    }

    pub async fn remove_scheduled_service(&self, service_id: &str) -> Result<()> {
        self.backend.hdel(keys::SCHEDULER_SERVICES, service_id).await
    }

    pub async fn list_scheduled_services(&self) -> Result<Vec<ScheduledService>> {
        let entries = self.backend.hgetall(keys::SCHEDULER_SERVICES).await?;
        entries
            .into_iter()
            .map(|(_, raw)| serde_json::from_str(&raw).map_err(StorageError::from))
            .collect()
    }

    // -- Dedup cache ------------------------------------------------------

    pub async fn get_cached_result(&self, cache_key: &str) -> Result<Option<ProbeResult>> {
        get_json(&self.backend, &keys::check_cache(cache_key)).await
    }

    pub async fn put_cached_result(
        &self,
        cache_key: &str,
        result: &ProbeResult,
        ttl_secs: u64,
    ) -> Result<()> {
        let raw = serde_json::to_string(result)?;
        self.backend
            .set_ex(&keys::check_cache(cache_key), &raw, ttl_secs)
            .await
    }

    // -- Metrics ----------------------------------------------------------

    pub async fn put_metrics(&self, metrics: &AggregatedMetrics, unix_millis: i64) -> Result<()> {
        set_json(
            &self.backend,
            &keys::metrics(&metrics.service_id, unix_millis),
            metrics,
        )
        .await
    }

    pub async fn list_metrics(&self, service_id: &str) -> Result<Vec<AggregatedMetrics>> {
        let keys = self.backend.keys(&keys::metrics_prefix(service_id)).await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(m) = get_json(&self.backend, &key).await? {
                out.push(m);
            }
        }
        Ok(out)
    }

    // -- Incidents ---------------------------------------------------------

    pub async fn get_incident(&self, incident_id: &str) -> Result<Option<Incident>> {
        get_json(&self.backend, &keys::incident(incident_id)).await
    }

    pub async fn put_incident(&self, incident: &Incident) -> Result<()> {
        set_json(&self.backend, &keys::incident(&incident.id), incident).await
    }

    // -- Worker fleet --------------------------------------------------------

    pub async fn get_worker_registration(&self, worker_id: &str) -> Result<Option<WorkerRegistration>> {
        match self
            .backend
            .hget(keys::WORKERS_REGISTRATIONS, worker_id)
            .await?
        {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put_worker_registration(&self, reg: &WorkerRegistration) -> Result<()> {
        let raw = serde_json::to_string(reg)?;
        self.backend
            .hset(keys::WORKERS_REGISTRATIONS, &reg.worker_id, &raw)
            .await
    }

    pub async fn mark_worker_pending(&self, worker_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.backend
            .zadd(keys::WORKERS_PENDING, worker_id, at.timestamp() as f64)
            .await
    }

    pub async fn clear_worker_pending(&self, worker_id: &str) -> Result<()> {
        self.backend.zrem(keys::WORKERS_PENDING, worker_id).await
    }

    pub async fn list_pending_worker_ids(&self) -> Result<Vec<String>> {
        self.backend.zrange(keys::WORKERS_PENDING, 0, -1).await
    }

    pub async fn put_worker_state(&self, state: &WorkerState) -> Result<()> {
        let raw = serde_json::to_string(state)?;
        self.backend
            .hset(keys::WORKERS_HEARTBEAT, &state.worker_id, &raw)
            .await
    }

    pub async fn get_worker_state(&self, worker_id: &str) -> Result<Option<WorkerState>> {
        match self.backend.hget(keys::WORKERS_HEARTBEAT, worker_id).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn list_worker_states(&self) -> Result<Vec<WorkerState>> {
        let entries = self.backend.hgetall(keys::WORKERS_HEARTBEAT).await?;
        entries
            .into_iter()
            .map(|(_, raw)| serde_json::from_str(&raw).map_err(StorageError::from))
            .collect()
    }

    pub async fn remove_worker_state(&self, worker_id: &str) -> Result<()> {
        self.backend.hdel(keys::WORKERS_HEARTBEAT, worker_id).await
    }

    /// Previous-heartbeat snapshot used by the anti-fraud verifier, kept
    /// separate from the display-facing `workers:heartbeat` hash because it
    /// needs its own TTL independent of the janitor's eviction sweep.
    pub async fn get_worker_verifier_state(&self, worker_id: &str) -> Result<Option<WorkerState>> {
        get_json(&self.backend, &keys::worker_state(worker_id)).await
    }

    pub async fn put_worker_verifier_state(&self, state: &WorkerState, ttl_secs: u64) -> Result<()> {
        let raw = serde_json::to_string(state)?;
        self.backend
            .set_ex(&keys::worker_state(&state.worker_id), &raw, ttl_secs)
            .await
    }

    // -- Users ---------------------------------------------------------------

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        get_json(&self.backend, &keys::user(user_id)).await
    }

    pub async fn put_user(&self, user: &User) -> Result<()> {
        set_json(&self.backend, &keys::user(&user.id), user).await?;
        self.backend
            .set(&keys::user_by_email(&user.email), &user.id)
            .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.backend.get(&keys::user_by_email(email)).await? {
            Some(user_id) => self.get_user(&user_id).await,
            None => Ok(None),
        }
    }

    // -- Auth audit trail ----------------------------------------------------

    /// Record a login attempt under a random audit id. The rate limiter
    /// keeps its own compact failure counter separately; this is the
    /// durable audit row the login algorithm calls for.
    pub async fn record_auth_attempt(&self, audit_id: &str, attempt: &AuthAttempt) -> Result<()> {
        set_json(&self.backend, &keys::audit(audit_id), attempt).await
    }

    // -- Billing ---------------------------------------------------------

    pub async fn get_billing(&self, billing_id: &str) -> Result<Option<BillingRecord>> {
        get_json(&self.backend, &keys::billing(billing_id)).await
    }

    pub async fn put_billing(&self, record: &BillingRecord) -> Result<()> {
        set_json(&self.backend, &keys::billing(&record.id), record).await
    }

    // -- Scheduler global counters -----------------------------------------

    pub async fn get_global_stats(&self) -> Result<GlobalStats> {
        Ok(get_json(&self.backend, keys::SCHEDULER_STATS_GLOBAL)
            .await?
            .unwrap_or_default())
    }

    pub async fn put_global_stats(&self, stats: &GlobalStats) -> Result<()> {
        set_json(&self.backend, keys::SCHEDULER_STATS_GLOBAL, stats).await
    }

    // -- Live status fan-out -----------------------------------------------

    pub async fn publish_sse(&self, nest_id: &str, event: &SseEvent) -> Result<()> {
        let raw = serde_json::to_string(event)?;
        self.backend.publish(&keys::sse_channel(nest_id), &raw).await
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    backend: &Arc<dyn StorageBackend>,
    key: &str,
) -> Result<Option<T>> {
    match backend.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

async fn set_json<T: serde::Serialize>(
    backend: &Arc<dyn StorageBackend>,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    backend.set(key, &raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_backend::MemoryBackend;

    fn sample_nest() -> Nest {
        Nest {
            id: "n1".into(),
            subdomain: "acme".into(),
            display_name: "Acme".into(),
            contact_email: "ops@acme.test".into(),
            tier: SubscriptionTier::Pro,
            tier_expires_at: None,
            settings: NestSettings::default(),
            status: NestStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn store() -> Store {
        Store::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn nest_roundtrips_by_id_and_subdomain() {
        let store = store();
        store.put_nest(&sample_nest()).await.unwrap();
        assert_eq!(store.get_nest("n1").await.unwrap().unwrap().subdomain, "acme");
        assert_eq!(
            store.get_nest_by_subdomain("acme").await.unwrap().unwrap().id,
            "n1"
        );
    }

    #[tokio::test]
    async fn cross_tenant_service_lookup_is_rejected() {
        let store = store();
        let service = Service {
            id: "s1".into(),
            nest_id: "n1".into(),
            name: "home page".into(),
            target: "https://acme.test".into(),
            interval_secs: 60,
            config: ServiceConfig::Ping,
            regions: RegionSelection::default(),
            notification_sinks: vec![],
            active: true,
            created_at: Utc::now(),
        };
        store.put_service(&service).await.unwrap();

        let err = store.get_service("other-nest", "s1").await.unwrap_err();
        assert!(matches!(err, StorageError::CrossTenant { .. }));
        assert!(store.get_service("n1", "s1").await.unwrap().is_some());
    }

    fn service(id: &str, nest_id: &str, active: bool) -> Service {
        Service {
            id: id.into(),
            nest_id: nest_id.into(),
            name: "test".into(),
            target: "https://acme.test".into(),
            interval_secs: 300,
            config: ServiceConfig::Ping,
            regions: RegionSelection::default(),
            notification_sinks: vec![],
            active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_service_enforces_free_tier_quota() {
        let store = store();
        let mut nest = sample_nest();
        nest.tier = SubscriptionTier::Free;
        store.put_nest(&nest).await.unwrap();

        for i in 0..nest.tier.quota() {
            store
                .create_service(&service(&format!("s{i}"), "n1", true))
                .await
                .unwrap();
        }

        let err = store
            .create_service(&service("s-overflow", "n1", true))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { quota: 5, .. }));
    }

    #[tokio::test]
    async fn deactivating_a_service_frees_a_quota_slot() {
        let store = store();
        let mut nest = sample_nest();
        nest.tier = SubscriptionTier::Free;
        store.put_nest(&nest).await.unwrap();

        for i in 0..nest.tier.quota() {
            store
                .create_service(&service(&format!("s{i}"), "n1", true))
                .await
                .unwrap();
        }
        assert!(store
            .create_service(&service("s-overflow", "n1", true))
            .await
            .is_err());

        let mut deactivated = service("s0", "n1", false);
        deactivated.created_at = store.get_service("n1", "s0").await.unwrap().unwrap().created_at;
        store.put_service(&deactivated).await.unwrap();

        store
            .create_service(&service("s-overflow", "n1", true))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn inactive_services_do_not_count_against_quota() {
        let store = store();
        let mut nest = sample_nest();
        nest.tier = SubscriptionTier::Free;
        store.put_nest(&nest).await.unwrap();

        for i in 0..nest.tier.quota() {
            store
                .create_service(&service(&format!("s{i}"), "n1", false))
                .await
                .unwrap();
        }

        store
            .create_service(&service("s-active", "n1", true))
            .await
            .unwrap();
    }
}
