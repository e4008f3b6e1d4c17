//! Worker registration, approval, and revocation — the six-state machine of
//! §4.2:
//!
//! ```text
//! UNREGISTERED -> PENDING -> APPROVED -> ACTIVE <-> STALE -> REVOKED
//!                    |                                  ^
//!                    +---------------- (reject) --------+
//! ```
//!
//! `ACTIVE <-> STALE` is the heartbeat janitor's concern (`nestwatch_scheduler`
//! owns the sweep); this module owns everything up to and including REVOKED.

use chrono::{DateTime, Utc};
use nestwatch_protocol::keys;
use nestwatch_protocol::types::{UserId, WorkerId, WorkerRegistration};
use nestwatch_storage::Store;

use crate::credentials;
use crate::error::{FleetError, Result};

pub struct RegistrationOutcome {
    pub registration: WorkerRegistration,
    /// `false` when the worker id was already on file — the registration
    /// endpoint returns the existing record rather than creating a
    /// duplicate or re-issuing credentials (§8 round-trip property).
    pub created: bool,
}

pub struct RegistrationService {
    store: Store,
}

impl RegistrationService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// `UNREGISTERED -> PENDING`.
    pub async fn register(
        &self,
        worker_id: WorkerId,
        hostname: String,
        platform: String,
        reporting_ip: String,
        public_key: Option<String>,
        owner_email: String,
    ) -> Result<RegistrationOutcome> {
        if worker_id.trim().is_empty() || hostname.trim().is_empty() {
            return Err(FleetError::Validation(
                "workerId and hostname are required".into(),
            ));
        }
        validate_email(&owner_email)?;

        if let Some(existing) = self.store.get_worker_registration(&worker_id).await? {
            return Ok(RegistrationOutcome {
                registration: existing,
                created: false,
            });
        }

        let now = Utc::now();
        let registration = WorkerRegistration::new(
            worker_id.clone(),
            owner_email.clone(),
            hostname,
            platform,
            reporting_ip,
            public_key,
            now,
        );
        self.store.put_worker_registration(&registration).await?;
        self.store.mark_worker_pending(&worker_id, now).await?;
        self.store
            .backend_ref()
            .sadd(&keys::workers_by_owner(&owner_email), &worker_id)
            .await?;

        Ok(RegistrationOutcome {
            registration,
            created: true,
        })
    }

    pub async fn status(&self, worker_id: &str) -> Result<WorkerRegistration> {
        self.store
            .get_worker_registration(worker_id)
            .await?
            .ok_or_else(|| FleetError::NotFound(worker_id.to_string()))
    }

    /// `PENDING -> APPROVED`: assigns a region (or leaves `auto`) and
    /// materializes broker credentials, serialized per workerId by the
    /// caller (§5 "the credential-issuance step... must be serialized per
    /// workerId" — this method does the issuance; callers own the lock).
    pub async fn approve(
        &self,
        worker_id: &str,
        approver_id: UserId,
        region: Option<String>,
    ) -> Result<WorkerRegistration> {
        let mut registration = self.status(worker_id).await?;
        if registration.revoked {
            return Err(FleetError::Conflict("worker has been revoked".into()));
        }

        registration.approved = true;
        registration.approved_at = Some(Utc::now());
        registration.approver_id = Some(approver_id);
        if let Some(region) = region {
            registration.region = region;
        }
        let (username, password) = credentials::materialize(&registration.worker_id);
        registration.broker_username = Some(username);
        registration.broker_password = Some(password);

        self.store.put_worker_registration(&registration).await?;
        self.store.clear_worker_pending(&registration.worker_id).await?;
        Ok(registration)
    }

    /// `PENDING -> REVOKED` (the diagram's "reject" transition).
    pub async fn reject(&self, worker_id: &str) -> Result<WorkerRegistration> {
        let mut registration = self.status(worker_id).await?;
        registration.revoked = true;
        self.store.put_worker_registration(&registration).await?;
        self.store.clear_worker_pending(&registration.worker_id).await?;
        Ok(registration)
    }

    /// `Any -> REVOKED`: deletes broker credentials; subsequent commands and
    /// heartbeats from this worker are unauthenticated and dropped.
    pub async fn revoke(&self, worker_id: &str) -> Result<WorkerRegistration> {
        let mut registration = self.status(worker_id).await?;
        registration.revoked = true;
        registration.broker_username = None;
        registration.broker_password = None;
        self.store.put_worker_registration(&registration).await?;
        Ok(registration)
    }

    /// The `rabbitmqUrl` returned from the status poll once approved —
    /// `None` until credentials exist or once revoked.
    pub fn broker_url(registration: &WorkerRegistration, broker_host: &str) -> Option<String> {
        if !registration.approved || registration.revoked {
            return None;
        }
        let username = registration.broker_username.as_ref()?;
        let password = registration.broker_password.as_ref()?;
        Some(format!("amqp://{username}:{password}@{broker_host}:5672"))
    }
}

fn validate_email(email: &str) -> Result<()> {
    // `^[^\s@]+@[^\s@]+\.[^\s@]+$`
    let Some(at) = email.find('@') else {
        return Err(FleetError::Validation("invalid owner email".into()));
    };
    let (local, rest) = email.split_at(at);
    let domain = &rest[1..];
    let valid_local = !local.is_empty() && !local.chars().any(char::is_whitespace);
    let valid_domain = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.chars().any(char::is_whitespace);
    if valid_local && valid_domain {
        Ok(())
    } else {
        Err(FleetError::Validation("invalid owner email".into()))
    }
}

/// Per-source-IP registration rate limit (§4.2 "Registration rate-limit"),
/// the same sorted-set-of-timestamps shape as `nestwatch_auth::RateLimiter`.
pub struct RegistrationRateLimiter {
    store: Store,
    max_per_hour: u32,
}

impl RegistrationRateLimiter {
    pub fn new(store: Store, max_per_hour: u32) -> Self {
        Self { store, max_per_hour }
    }

    pub async fn check_and_record(&self, ip: &str, at: DateTime<Utc>) -> Result<()> {
        let key = keys::registration_attempts(ip);
        let window_start = at - chrono::Duration::hours(1);
        let recent = self
            .store
            .backend_ref()
            .zrangebyscore(
                &key,
                window_start.timestamp_millis() as f64,
                at.timestamp_millis() as f64,
            )
            .await?;
        if recent.len() as u32 >= self.max_per_hour {
            return Err(FleetError::RateLimited);
        }

        let member = format!("{}-{:x}", at.timestamp_millis(), rand::random::<u32>());
        self.store
            .backend_ref()
            .zadd(&key, &member, at.timestamp_millis() as f64)
            .await?;
        self.store.backend_ref().expire(&key, 3600).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestwatch_storage::memory_backend::MemoryBackend;
    use std::sync::Arc;

    fn store() -> Store {
        Store::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn registering_the_same_worker_twice_returns_the_original_record() {
        let service = RegistrationService::new(store());
        let first = service
            .register(
                "w1".into(),
                "host-a".into(),
                "linux".into(),
                "10.0.0.1".into(),
                None,
                "owner@example.com".into(),
            )
            .await
            .unwrap();
        assert!(first.created);

        let second = service
            .register(
                "w1".into(),
                "host-b".into(),
                "windows".into(),
                "10.0.0.2".into(),
                None,
                "someone-else@example.com".into(),
            )
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.registration.hostname, "host-a");
        assert_eq!(second.registration.owner_email, "owner@example.com");
    }

    #[tokio::test]
    async fn registration_rejects_malformed_email() {
        let service = RegistrationService::new(store());
        let err = service
            .register(
                "w1".into(),
                "host-a".into(),
                "linux".into(),
                "10.0.0.1".into(),
                None,
                "not-an-email".into(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
    }

    #[tokio::test]
    async fn approval_materializes_broker_credentials() {
        let service = RegistrationService::new(store());
        service
            .register(
                "w1".into(),
                "host-a".into(),
                "linux".into(),
                "10.0.0.1".into(),
                None,
                "owner@example.com".into(),
            )
            .await
            .unwrap();

        let status_before = service.status("w1").await.unwrap();
        assert!(!status_before.approved);
        assert!(RegistrationService::broker_url(&status_before, "broker.internal").is_none());

        let approved = service.approve("w1", "admin-1".into(), None).await.unwrap();
        assert!(approved.approved);
        assert_eq!(approved.region, "auto");
        let url = RegistrationService::broker_url(&approved, "broker.internal").unwrap();
        assert!(url.starts_with("amqp://worker-w1:"));
        assert!(url.ends_with("@broker.internal:5672"));
    }

    #[tokio::test]
    async fn revoking_a_worker_clears_broker_credentials() {
        let service = RegistrationService::new(store());
        service
            .register(
                "w1".into(),
                "host-a".into(),
                "linux".into(),
                "10.0.0.1".into(),
                None,
                "owner@example.com".into(),
            )
            .await
            .unwrap();
        service.approve("w1", "admin-1".into(), None).await.unwrap();

        let revoked = service.revoke("w1").await.unwrap();
        assert!(revoked.revoked);
        assert!(RegistrationService::broker_url(&revoked, "broker.internal").is_none());
    }

    #[tokio::test]
    async fn rate_limiter_blocks_after_the_configured_threshold() {
        let limiter = RegistrationRateLimiter::new(store(), 2);
        let now = Utc::now();
        limiter.check_and_record("10.0.0.9", now).await.unwrap();
        limiter.check_and_record("10.0.0.9", now).await.unwrap();
        let err = limiter.check_and_record("10.0.0.9", now).await.unwrap_err();
        assert!(matches!(err, FleetError::RateLimited));
    }
}
