//! Worker-side heartbeat construction and signing (§4.3 gate 1).

use chrono::Utc;
use nestwatch_protocol::types::{HeartbeatMessage, WorkerEarnings, WorkerLocation};

/// Running totals a worker accumulates between heartbeats. Plain data; the
/// run loop owns mutating it as results come back from probes.
#[derive(Debug, Clone, Default)]
pub struct WorkerTally {
    pub checks_completed: u64,
    pub total_points: f64,
    pub current_period_points: f64,
}

impl WorkerTally {
    pub fn record_check(&mut self, points: f64) {
        self.checks_completed += 1;
        self.total_points += points;
        self.current_period_points += points;
    }
}

/// Build and, if a signing key was issued at registration, sign a heartbeat
/// for the current tally.
pub fn build_heartbeat(
    worker_id: &str,
    region: &str,
    version: &str,
    tally: &WorkerTally,
    location: WorkerLocation,
    signing_key: Option<&str>,
) -> HeartbeatMessage {
    let now = Utc::now();
    let mut heartbeat = HeartbeatMessage {
        worker_id: worker_id.to_string(),
        region: region.to_string(),
        version: version.to_string(),
        last_seen: now.timestamp_millis(),
        checks_completed: tally.checks_completed,
        total_points: tally.total_points,
        current_period_points: tally.current_period_points,
        earnings: WorkerEarnings {
            points: tally.total_points,
            estimated_usd: tally.total_points * 0.001,
            estimated_crypto: 0.0,
        },
        location,
        timestamp: now.timestamp_millis(),
        signature: None,
    };
    if let Some(key) = signing_key {
        heartbeat.signature = Some(nestwatch_auth::signing::compute_signature(&heartbeat, key));
    }
    heartbeat
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> WorkerLocation {
        WorkerLocation {
            continent: None,
            country: None,
            city: None,
            region: "us-east-1".into(),
        }
    }

    #[test]
    fn unsigned_heartbeat_has_no_signature_without_a_key() {
        let tally = WorkerTally::default();
        let hb = build_heartbeat("w1", "us-east-1", "1.0.0", &tally, location(), None);
        assert!(hb.signature.is_none());
    }

    #[test]
    fn signed_heartbeat_verifies_against_the_same_key() {
        let mut tally = WorkerTally::default();
        tally.record_check(5.0);
        let hb = build_heartbeat("w1", "us-east-1", "1.0.0", &tally, location(), Some("secret"));
        assert!(nestwatch_auth::signing::verify(&hb, Some("secret")));
    }

    #[test]
    fn tally_accumulates_points_and_checks() {
        let mut tally = WorkerTally::default();
        tally.record_check(3.0);
        tally.record_check(2.0);
        assert_eq!(tally.checks_completed, 2);
        assert_eq!(tally.total_points, 5.0);
    }
}
