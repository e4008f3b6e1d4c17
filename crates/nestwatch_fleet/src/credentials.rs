//! Broker credential materialization, the PENDING → APPROVED step of §4.2.
//!
//! Mirrors `nestwatch_auth::jwt::generate_opaque_token`'s shape: 256 bits of
//! CSPRNG output, hex-encoded so the result is URL-safe without needing a
//! base64 dependency this workspace otherwise has no use for.

use rand::RngCore;

/// `worker-<workerId>` — the broker account name scoped to this worker's
/// own command queues and the results/heartbeat exchanges.
pub fn broker_username(worker_id: &str) -> String {
    format!("worker-{worker_id}")
}

/// 256 bits of randomness, hex-encoded (64 characters) — comfortably past
/// the ">= 40 URL-safe characters" boundary in §8 scenario 4.
pub fn generate_broker_password() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate both halves of a fresh broker credential for a newly approved
/// worker. Called exactly once per approval — the spec requires this step
/// be serialized per workerId, which is the registration service's job, not
/// this free function's.
pub fn materialize(worker_id: &str) -> (String, String) {
    (broker_username(worker_id), generate_broker_password())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_long_enough_and_url_safe() {
        let pw = generate_broker_password();
        assert!(pw.len() >= 40);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn passwords_are_not_reused_across_calls() {
        assert_ne!(generate_broker_password(), generate_broker_password());
    }

    #[test]
    fn username_is_prefixed_with_worker() {
        assert_eq!(broker_username("abc123"), "worker-abc123");
    }
}
