//! Heartbeat acceptance and the staleness janitor (§4.3).
//!
//! Accepting a heartbeat delegates entirely to `HeartbeatVerifier`; this
//! module only owns what happens to an accepted/rejected heartbeat in the
//! scheduler's own `workers:heartbeat` display hash, plus the periodic
//! sweep that evicts workers nobody has heard from in a while.

use chrono::{DateTime, Utc};
use nestwatch_fleet::verifier::HeartbeatVerifier;
use nestwatch_protocol::types::{HeartbeatMessage, WorkerRegistration};
use nestwatch_storage::Store;
use tracing::{info, warn};

use crate::error::Result;

/// Verify and, if accepted, record a heartbeat in the display-facing
/// `workers:heartbeat` hash. Rejections are logged and swallowed here
/// (§7: `Integrity` errors are dropped, never surfaced to the caller) —
/// the message is simply not acknowledged as having moved the worker's
/// state forward.
pub async fn accept_heartbeat(
    store: &Store,
    verifier: &HeartbeatVerifier,
    heartbeat: &HeartbeatMessage,
    now: DateTime<Utc>,
) -> Result<bool> {
    let registration = store.get_worker_registration(&heartbeat.worker_id).await?;
    match verifier.verify(heartbeat, registration.as_ref(), now).await {
        Ok(verified) => {
            if verified.geographic_anomaly {
                warn!(worker_id = %heartbeat.worker_id, "heartbeat accepted with geographic anomaly flag");
            }
            store.put_worker_state(&verified.state).await?;
            Ok(true)
        }
        Err(err) => {
            warn!(worker_id = %heartbeat.worker_id, error = %err, "heartbeat rejected");
            Ok(false)
        }
    }
}

/// Evict any worker whose `workers:heartbeat` entry is older than
/// `timeout_ms` (§4.3 "heartbeat janitor"). Returns the evicted worker ids.
pub async fn sweep_stale_workers(store: &Store, timeout_ms: u64, now: DateTime<Utc>) -> Result<Vec<String>> {
    let timeout = chrono::Duration::milliseconds(timeout_ms as i64);
    let mut evicted = Vec::new();
    for state in store.list_worker_states().await? {
        if now - state.last_seen > timeout {
            store.remove_worker_state(&state.worker_id).await?;
            info!(worker_id = %state.worker_id, "evicted stale worker from heartbeat table");
            evicted.push(state.worker_id);
        }
    }
    Ok(evicted)
}

/// True when a worker is allowed to receive dispatches: known, approved,
/// and not revoked (§4.2's lifecycle gate applied at dispatch time).
pub fn is_dispatchable(registration: &WorkerRegistration) -> bool {
    registration.approved && !registration.revoked
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestwatch_protocol::types::{WorkerEarnings, WorkerLocation, WorkerState};
    use nestwatch_storage::memory_backend::MemoryBackend;
    use std::sync::Arc;

    fn store() -> Store {
        Store::new(Arc::new(MemoryBackend::new()))
    }

    fn heartbeat(worker_id: &str, at: DateTime<Utc>) -> HeartbeatMessage {
        HeartbeatMessage {
            worker_id: worker_id.into(),
            region: "us-east-1".into(),
            version: "1.0.0".into(),
            last_seen: at.timestamp_millis(),
            checks_completed: 1,
            total_points: 10.0,
            current_period_points: 0.0,
            earnings: WorkerEarnings {
                points: 10.0,
                estimated_usd: 0.0,
                estimated_crypto: 0.0,
            },
            location: WorkerLocation {
                continent: None,
                country: None,
                city: None,
                region: "us-east-1".into(),
            },
            timestamp: at.timestamp_millis(),
            signature: None,
        }
    }

    #[tokio::test]
    async fn accepted_heartbeat_is_recorded_in_the_display_hash() {
        let store = store();
        let verifier = HeartbeatVerifier::new(store.clone(), false);
        let now = Utc::now();
        let accepted = accept_heartbeat(&store, &verifier, &heartbeat("w1", now), now)
            .await
            .unwrap();
        assert!(accepted);
        assert!(store.get_worker_state("w1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rejected_heartbeat_is_not_recorded() {
        let store = store();
        let verifier = HeartbeatVerifier::new(store.clone(), false);
        let now = Utc::now();
        let stale = heartbeat("w1", now - chrono::Duration::seconds(301));
        let accepted = accept_heartbeat(&store, &verifier, &stale, now).await.unwrap();
        assert!(!accepted);
        assert!(store.get_worker_state("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn janitor_evicts_workers_past_the_timeout() {
        let store = store();
        let now = Utc::now();
        store
            .put_worker_state(&WorkerState {
                worker_id: "stale".into(),
                region: "us-east-1".into(),
                version: "1.0.0".into(),
                last_seen: now - chrono::Duration::milliseconds(200_000),
                checks_completed: 1,
                total_points: 1.0,
                current_period_points: 0.0,
                earnings: WorkerEarnings {
                    points: 1.0,
                    estimated_usd: 0.0,
                    estimated_crypto: 0.0,
                },
                location: WorkerLocation {
                    continent: None,
                    country: None,
                    city: None,
                    region: "us-east-1".into(),
                },
            })
            .await
            .unwrap();
        store
            .put_worker_state(&WorkerState {
                worker_id: "fresh".into(),
                region: "us-east-1".into(),
                version: "1.0.0".into(),
                last_seen: now,
                checks_completed: 1,
                total_points: 1.0,
                current_period_points: 0.0,
                earnings: WorkerEarnings {
                    points: 1.0,
                    estimated_usd: 0.0,
                    estimated_crypto: 0.0,
                },
                location: WorkerLocation {
                    continent: None,
                    country: None,
                    city: None,
                    region: "us-east-1".into(),
                },
            })
            .await
            .unwrap();

        let evicted = sweep_stale_workers(&store, 120_000, now).await.unwrap();
        assert_eq!(evicted, vec!["stale".to_string()]);
        assert!(store.get_worker_state("fresh").await.unwrap().is_some());
    }
}
