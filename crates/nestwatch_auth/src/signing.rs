//! Heartbeat signature gate (§4.3 gate 1).
//!
//! The specification's own wording is the contract: serialize the heartbeat
//! minus `signature` to canonical JSON, then verify with SHA-256 over the
//! stored public key. That is not an asymmetric-signature scheme — there is
//! no private-key proof here, only a shared-secret-shaped digest — so this
//! module deliberately does not reach for `ed25519-dalek`. Documented as an
//! explicit decision rather than left ambiguous: the "public key" on file
//! for a worker acts as a pre-shared digest key, and a worker without one
//! registered passes this gate unconditionally (§ REDESIGN FLAGS notes this
//! is a bootstrap affordance, not a final security posture).

use nestwatch_protocol::types::HeartbeatMessage;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Serialize)]
struct SignableHeartbeat<'a> {
    worker_id: &'a str,
    region: &'a str,
    version: &'a str,
    last_seen: i64,
    checks_completed: u64,
    total_points: f64,
    current_period_points: f64,
    earnings: &'a nestwatch_protocol::types::WorkerEarnings,
    location: &'a nestwatch_protocol::types::WorkerLocation,
    timestamp: i64,
}

impl<'a> From<&'a HeartbeatMessage> for SignableHeartbeat<'a> {
    fn from(m: &'a HeartbeatMessage) -> Self {
        Self {
            worker_id: &m.worker_id,
            region: &m.region,
            version: &m.version,
            last_seen: m.last_seen,
            checks_completed: m.checks_completed,
            total_points: m.total_points,
            current_period_points: m.current_period_points,
            earnings: &m.earnings,
            location: &m.location,
            timestamp: m.timestamp,
        }
    }
}

/// Compute the expected signature for a heartbeat given the worker's
/// registered public key.
pub fn compute_signature(heartbeat: &HeartbeatMessage, public_key: &str) -> String {
    let signable = SignableHeartbeat::from(heartbeat);
    let canonical = serde_json::to_string(&signable).expect("heartbeat always serializes");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(public_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Gate 1: signature. Returns `true` when the heartbeat passes — either it
/// carries a signature matching the registered public key, or the worker
/// has no public key on file yet.
pub fn verify(heartbeat: &HeartbeatMessage, registered_public_key: Option<&str>) -> bool {
    match registered_public_key {
        None => true,
        Some(public_key) => match &heartbeat.signature {
            Some(sig) => sig == &compute_signature(heartbeat, public_key),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestwatch_protocol::types::{WorkerEarnings, WorkerLocation};

    fn sample(signature: Option<String>) -> HeartbeatMessage {
        HeartbeatMessage {
            worker_id: "w1".into(),
            region: "us-east-1".into(),
            version: "1.0.0".into(),
            last_seen: 1_700_000_000_000,
            checks_completed: 10,
            total_points: 100.0,
            current_period_points: 5.0,
            earnings: WorkerEarnings {
                points: 100.0,
                estimated_usd: 1.0,
                estimated_crypto: 0.0,
            },
            location: WorkerLocation {
                continent: None,
                country: None,
                city: None,
                region: "us-east-1".into(),
            },
            timestamp: 1_700_000_000_500,
            signature,
        }
    }

    #[test]
    fn no_registered_key_passes_unconditionally() {
        assert!(verify(&sample(None), None));
    }

    #[test]
    fn missing_signature_with_registered_key_fails() {
        assert!(!verify(&sample(None), Some("pubkey")));
    }

    #[test]
    fn matching_signature_passes() {
        let mut hb = sample(None);
        hb.signature = Some(compute_signature(&hb, "pubkey"));
        assert!(verify(&hb, Some("pubkey")));
    }

    #[test]
    fn tampered_field_fails_verification() {
        let mut hb = sample(None);
        hb.signature = Some(compute_signature(&hb, "pubkey"));
        hb.checks_completed += 1;
        assert!(!verify(&hb, Some("pubkey")));
    }
}
