//! Heartbeat anti-fraud verifier (§4.3): five ordered gates, plus the
//! periodic cross-worker anomaly sweep.
//!
//! Gate 1 (signature) is composed from `nestwatch_auth::signing` rather than
//! reimplemented here — it's the one gate that needs the worker's registered
//! public key, which this crate already threads through for registration.

use chrono::{DateTime, Utc};
use nestwatch_protocol::defaults::{
    HEARTBEAT_FRESHNESS_SECS, MAX_POINTS_PER_SECOND, REGION_CHANGE_MIN_GAP_SECS,
    WORKER_STATE_TTL_SECS,
};
use nestwatch_protocol::types::{HeartbeatMessage, WorkerId, WorkerLocation, WorkerRegistration, WorkerState};
use nestwatch_storage::Store;

use crate::error::{FleetError, Result};

/// Result of an accepted heartbeat: the sanitized state now on file, and
/// whether gate 5 merely flagged (rather than rejected) a region change.
pub struct VerifiedHeartbeat {
    pub state: WorkerState,
    pub geographic_anomaly: bool,
}

pub struct HeartbeatVerifier {
    store: Store,
    /// §9's policy flag: tighten gate 1 to reject an unsigned heartbeat from
    /// a worker that has a public key on file. Defaults to `false`, matching
    /// the spec's stated bootstrap posture.
    require_signature_once_enrolled: bool,
}

impl HeartbeatVerifier {
    pub fn new(store: Store, require_signature_once_enrolled: bool) -> Self {
        Self {
            store,
            require_signature_once_enrolled,
        }
    }

    pub async fn verify(
        &self,
        heartbeat: &HeartbeatMessage,
        registration: Option<&WorkerRegistration>,
        now: DateTime<Utc>,
    ) -> Result<VerifiedHeartbeat> {
        let public_key = registration.and_then(|r| r.public_key.as_deref());

        // Gate 1: signature.
        if !nestwatch_auth::signing::verify(heartbeat, public_key) {
            return Err(FleetError::Integrity("invalid signature"));
        }
        if self.require_signature_once_enrolled && public_key.is_some() && heartbeat.signature.is_none() {
            return Err(FleetError::Integrity("signature required"));
        }

        let hb_time = DateTime::from_timestamp_millis(heartbeat.timestamp)
            .ok_or(FleetError::Integrity("unparseable timestamp"))?;

        // Gate 2: freshness.
        if (now - hb_time).num_seconds().abs() > HEARTBEAT_FRESHNESS_SECS {
            return Err(FleetError::Integrity("stale heartbeat"));
        }

        let previous = self.store.get_worker_verifier_state(&heartbeat.worker_id).await?;
        let mut geographic_anomaly = false;

        if let Some(prev) = &previous {
            // Gate 3: monotonic progression.
            if heartbeat.total_points < prev.total_points
                || heartbeat.checks_completed < prev.checks_completed
            {
                return Err(FleetError::Integrity("non-monotonic progression"));
            }

            // Gate 4: plausible accrual rate. Compared as gain vs. a
            // max-gain bound (MAX_POINTS_PER_SECOND * elapsed) rather than
            // gain/elapsed vs. MAX_POINTS_PER_SECOND so the §8 boundary case
            // (exactly 10*dt accepted, 10*dt+1 rejected) holds without a
            // floating-point division masking the edge.
            let elapsed_secs = (hb_time - prev.last_seen).num_milliseconds() as f64 / 1000.0;
            let gain = heartbeat.total_points - prev.total_points;
            let max_gain = MAX_POINTS_PER_SECOND * elapsed_secs.max(0.0);
            if gain > max_gain {
                return Err(FleetError::Integrity("implausible point accrual rate"));
            }

            // Gate 5: geographic stability. A region change is flagged, not
            // rejected, unless it happened too soon after the last one.
            if heartbeat.region != prev.region {
                let gap_secs = (hb_time - prev.last_seen).num_seconds();
                if gap_secs < REGION_CHANGE_MIN_GAP_SECS {
                    geographic_anomaly = true;
                }
            }
        }

        let state = WorkerState {
            worker_id: heartbeat.worker_id.clone(),
            region: sanitize(&heartbeat.region),
            version: sanitize(&heartbeat.version),
            last_seen: hb_time,
            checks_completed: heartbeat.checks_completed,
            total_points: heartbeat.total_points,
            current_period_points: heartbeat.current_period_points,
            earnings: heartbeat.earnings.clone(),
            location: sanitize_location(&heartbeat.location),
        };
        self.store
            .put_worker_verifier_state(&state, WORKER_STATE_TTL_SECS)
            .await?;

        Ok(VerifiedHeartbeat {
            state,
            geographic_anomaly,
        })
    }
}

/// Restrict a string field to `[A-Za-z0-9 _.\-@]{<=100}` on acceptance.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || " _.-@".contains(*c))
        .take(100)
        .collect()
}

fn sanitize_location(location: &WorkerLocation) -> WorkerLocation {
    WorkerLocation {
        continent: location.continent.as_deref().map(sanitize),
        country: location.country.as_deref().map(sanitize),
        city: location.city.as_deref().map(sanitize),
        region: sanitize(&location.region),
    }
}

/// One worker flagged by the periodic anomaly sweep (§4.3).
#[derive(Debug, Clone)]
pub struct AnomalyFlag {
    pub worker_id: WorkerId,
    pub total_points: f64,
    pub z_score: f64,
}

/// Mean/standard-deviation sweep of `totalPoints` across active workers,
/// flagging anything more than 3 sigma from the mean. Reads the scheduler's
/// `workers:heartbeat` hash (the display-facing "currently active" set)
/// rather than the verifier's own TTL'd previous-state keys, since those two
/// populations are meant to track the same set of live workers.
pub async fn anomaly_sweep(store: &Store) -> Result<Vec<AnomalyFlag>> {
    let states = store.list_worker_states().await?;
    if states.len() < 2 {
        return Ok(Vec::new());
    }

    let n = states.len() as f64;
    let mean = states.iter().map(|s| s.total_points).sum::<f64>() / n;
    let variance = states
        .iter()
        .map(|s| (s.total_points - mean).powi(2))
        .sum::<f64>()
        / n;
    let stddev = variance.sqrt();
    if stddev == 0.0 {
        return Ok(Vec::new());
    }

    Ok(states
        .into_iter()
        .filter_map(|s| {
            let z = (s.total_points - mean) / stddev;
            (z.abs() > 3.0).then(|| AnomalyFlag {
                worker_id: s.worker_id,
                total_points: s.total_points,
                z_score: z,
            })
        })
        .collect())
}
