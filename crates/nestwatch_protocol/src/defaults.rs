//! Canonical default values for the scheduler, worker fleet, and auth core.
//!
//! Mirrors the "Configuration" table in the spec so every process boots
//! with the same numbers even when no config file is supplied.

/// Scheduler tick interval (T_TICK), milliseconds.
pub const DEFAULT_TICK_MS: u64 = 5_000;
/// Dedup window (T_DEDUP), seconds.
pub const DEFAULT_DEDUP_TTL_SECS: u64 = 30;
/// Worker heartbeat staleness timeout, milliseconds.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 120_000;
/// Heartbeat janitor sweep interval, seconds.
pub const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 60;
/// Registration rate limit, registrations per source IP per hour.
pub const DEFAULT_MAX_REGISTRATIONS_PER_IP_PER_HOUR: u32 = 5;
/// Heartbeat freshness window, seconds (gate 2 of the verifier).
pub const HEARTBEAT_FRESHNESS_SECS: i64 = 300;
/// Maximum plausible point-accrual rate, points per second (gate 4).
pub const MAX_POINTS_PER_SECOND: f64 = 10.0;
/// Minimum time between accepted region changes before it is no longer
/// merely flagged but required, seconds (gate 5).
pub const REGION_CHANGE_MIN_GAP_SECS: i64 = 3600;
/// Worker previous-heartbeat-state TTL, seconds.
pub const WORKER_STATE_TTL_SECS: u64 = 24 * 3600;
/// Probe command staleness bound workers must enforce, seconds (2x default max interval).
pub const DEFAULT_COMMAND_MAX_AGE_SECS: i64 = 60;

pub const DEFAULT_JWT_ACCESS_TTL_SECS: i64 = 15 * 60;
pub const DEFAULT_JWT_REFRESH_TTL_SECS: i64 = 30 * 24 * 3600;
pub const DEFAULT_PASSWORD_MIN_LENGTH: usize = 10;
pub const DEFAULT_BCRYPT_COST: u32 = 12;
pub const DEFAULT_LOGIN_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOGIN_WINDOW_SECS: i64 = 15 * 60;
pub const DEFAULT_LOCKOUT_DURATION_SECS: i64 = 15 * 60;

/// AMQP exchange and routing key constants (§6).
pub mod amqp {
    pub const EXCHANGE_WORKER_COMMANDS: &str = "worker_commands";
    pub const EXCHANGE_MONITORING_RESULTS: &str = "monitoring_results";
    pub const EXCHANGE_WORKER_HEARTBEAT: &str = "worker_heartbeat";

    pub const ROUTING_KEY_CHECK_SERVICE_ONCE: &str = "check_service_once";
    pub const ROUTING_KEY_MONITOR_SERVICE: &str = "monitor_service";
    pub const ROUTING_KEY_STOP_MONITORING: &str = "stop_monitoring";
    pub const ROUTING_KEY_CHECK_COMPLETED: &str = "check_completed";

    pub fn routing_key_for_region(region: &str) -> String {
        format!("{}.{}", ROUTING_KEY_CHECK_SERVICE_ONCE, region)
    }

    pub fn worker_queue_name(region: &str, worker_id: &str) -> String {
        format!("worker.{}.{}", region, worker_id)
    }

    pub const DEAD_LETTER_QUEUE: &str = "worker.dlq";
}
