//! Tenant-scoped storage key scheme (§4.5).
//!
//! Every key builder lives here so the storage layer, scheduler, and fleet
//! crates never hand-format a key string and risk drifting from the scheme.

/// `nest:<nestId>`
pub fn nest(nest_id: &str) -> String {
    format!("nest:{nest_id}")
}

/// `nest:subdomain:<subdomain>` — secondary index to a nest id.
pub fn nest_by_subdomain(subdomain: &str) -> String {
    format!("nest:subdomain:{subdomain}")
}

/// `nest:<nestId>:services` — secondary index avoiding the `service:*` scan.
pub fn nest_services(nest_id: &str) -> String {
    format!("nest:{nest_id}:services")
}

/// `service:<serviceId>`
pub fn service(service_id: &str) -> String {
    format!("service:{service_id}")
}

/// `service:*` — prefix for the fallback full scan (§4.5 notes this should
/// be avoided once `nest_services` is populated).
pub const SERVICE_PREFIX: &str = "service:";

/// `metrics:<serviceId>:<unixMillis>`
pub fn metrics(service_id: &str, unix_millis: i64) -> String {
    format!("metrics:{service_id}:{unix_millis}")
}

/// `metrics:<serviceId>:` — prefix for listing a service's metric rollups.
pub fn metrics_prefix(service_id: &str) -> String {
    format!("metrics:{service_id}:")
}

/// `incident:<incidentId>`
pub fn incident(incident_id: &str) -> String {
    format!("incident:{incident_id}")
}

/// `billing:<billingId>`
pub fn billing(billing_id: &str) -> String {
    format!("billing:{billing_id}")
}

/// `audit:<auditId>`
pub fn audit(audit_id: &str) -> String {
    format!("audit:{audit_id}")
}

/// `status:<nestId>:<serviceId>` — derived cache of the latest status.
pub fn status(nest_id: &str, service_id: &str) -> String {
    format!("status:{nest_id}:{service_id}")
}

/// `scheduler:services` — scheduler-owned hash of scheduled-service records.
pub const SCHEDULER_SERVICES: &str = "scheduler:services";

/// `scheduler:stats:global`
pub const SCHEDULER_STATS_GLOBAL: &str = "scheduler:stats:global";

/// `check:cache:<cacheKey>` — TTL'd dedup cache entry.
pub fn check_cache(cache_key: &str) -> String {
    format!("check:cache:{cache_key}")
}

/// `workers:registrations` — hash of worker id -> registration record.
pub const WORKERS_REGISTRATIONS: &str = "workers:registrations";

/// `workers:pending` — sorted set of worker ids by arrival time.
pub const WORKERS_PENDING: &str = "workers:pending";

/// `workers:by-owner:<email>` — set of worker ids.
pub fn workers_by_owner(email: &str) -> String {
    format!("workers:by-owner:{email}")
}

/// `workers:heartbeat` — hash of worker id -> last heartbeat snapshot.
pub const WORKERS_HEARTBEAT: &str = "workers:heartbeat";

/// `worker:state:<workerId>` — TTL'd previous-heartbeat-state for the
/// anti-fraud verifier.
pub fn worker_state(worker_id: &str) -> String {
    format!("worker:state:{worker_id}")
}

/// `user:<userId>`
pub fn user(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// `user:email:<email>` — secondary index to a user id.
pub fn user_by_email(email: &str) -> String {
    format!("user:email:{email}")
}

/// `sse:<nestId>` — pub/sub channel for live status-page updates.
pub fn sse_channel(nest_id: &str) -> String {
    format!("sse:{nest_id}")
}

/// `auth:attempts:<email>` — sorted set of auth-attempt timestamps, used by
/// the rate limiter to count failures within the configured login window.
pub fn auth_attempts(email: &str) -> String {
    format!("auth:attempts:{email}")
}

/// `workers:registrations:rate:<ip>` — sorted set of registration-attempt
/// timestamps for a source IP, used by the per-IP registration rate limit
/// (§4.2 "Registration rate-limit").
pub fn registration_attempts(ip: &str) -> String {
    format!("workers:registrations:rate:{ip}")
}

/// Secret-manager path for an externally-stored password record: §4.6's
/// `secrets/users/passwords/<userId>`. Not a storage-backend key — this is
/// the path used against the Vault-shaped HTTP API, kept here so both
/// callers (the password store and any migration tooling) agree on it.
pub fn vault_password_path(user_id: &str) -> String {
    format!("secrets/users/passwords/{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_colon_delimited_and_tenant_first() {
        assert_eq!(nest("n1"), "nest:n1");
        assert_eq!(service("s1"), "service:s1");
        assert_eq!(status("n1", "s1"), "status:n1:s1");
        assert_eq!(metrics("s1", 1_700_000_000_000), "metrics:s1:1700000000000");
        assert_eq!(worker_state("w1"), "worker:state:w1");
        assert_eq!(sse_channel("n1"), "sse:n1");
    }

    #[test]
    fn nest_services_index_is_scoped_per_nest() {
        assert_ne!(nest_services("n1"), nest_services("n2"));
    }
}
