//! Canonical data model shared by every process in the monitoring core.
//!
//! These types are the wire format: they are serialized onto the message
//! bus, written into tenant-scoped storage, and returned from admin/public
//! APIs that sit outside this crate's scope. Keep them serde-stable.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque tenant identifier.
pub type NestId = String;
/// Opaque service (watcher) identifier.
pub type ServiceId = String;
/// Opaque worker identifier.
pub type WorkerId = String;
/// Opaque incident identifier.
pub type IncidentId = String;
/// Opaque user identifier.
pub type UserId = String;

// ---------------------------------------------------------------------
// Nest (tenant)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Unlimited,
}

impl SubscriptionTier {
    /// Active-service quota for the tier. Enforced by the Conflict error
    /// path in the admin collaborator; the core only ever reads it.
    pub fn quota(&self) -> u32 {
        match self {
            SubscriptionTier::Free => 5,
            SubscriptionTier::Pro => 50,
            SubscriptionTier::Unlimited => u32::MAX,
        }
    }

    /// Minimum check interval the tier is allowed to schedule at.
    pub fn min_interval_secs(&self) -> u32 {
        match self {
            SubscriptionTier::Free => 300,
            SubscriptionTier::Pro => 30,
            SubscriptionTier::Unlimited => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NestStatus {
    Active,
    Suspended,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestSettings {
    pub public: bool,
    pub timezone: String,
    pub language: String,
}

impl Default for NestSettings {
    fn default() -> Self {
        Self {
            public: true,
            timezone: "UTC".to_string(),
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nest {
    pub id: NestId,
    pub subdomain: String,
    pub display_name: String,
    pub contact_email: String,
    pub tier: SubscriptionTier,
    pub tier_expires_at: Option<DateTime<Utc>>,
    pub settings: NestSettings,
    pub status: NestStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// Service (watcher)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Web,
    Tcp,
    Ping,
    Github,
    #[serde(rename = "uptime-api")]
    UptimeApi,
    Keyword,
    Heartbeat,
    Port,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegionStrategy {
    Closest,
    AllSelected,
    RoundRobin,
    Failover,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSelection {
    pub regions: Vec<String>,
    pub strategy: RegionStrategy,
    pub min_regions: u32,
    pub max_regions: u32,
}

impl Default for RegionSelection {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            strategy: RegionStrategy::AllSelected,
            min_regions: 1,
            max_regions: 1,
        }
    }
}

/// Type-specific probe configuration.
///
/// Tagged on `type` so the worker can match exhaustively instead of poking
/// around in a dynamic config bag. Unknown fields for a given service type
/// are rejected at construction time by the admin collaborator, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServiceConfig {
    Web {
        method: String,
        headers: HashMap<String, String>,
        expected_status: Option<u16>,
        body_keyword: Option<String>,
    },
    Tcp {
        port: u16,
    },
    Ping,
    Github {
        repo: String,
    },
    #[serde(rename = "uptime-api")]
    UptimeApi {
        endpoint: String,
    },
    Keyword {
        method: String,
        headers: HashMap<String, String>,
        keyword: String,
        keyword_must_exist: bool,
    },
    Heartbeat {
        grace_period_secs: u32,
    },
    Port {
        port: u16,
    },
}

impl ServiceConfig {
    pub fn service_type(&self) -> ServiceType {
        match self {
            ServiceConfig::Web { .. } => ServiceType::Web,
            ServiceConfig::Tcp { .. } => ServiceType::Tcp,
            ServiceConfig::Ping => ServiceType::Ping,
            ServiceConfig::Github { .. } => ServiceType::Github,
            ServiceConfig::UptimeApi { .. } => ServiceType::UptimeApi,
            ServiceConfig::Keyword { .. } => ServiceType::Keyword,
            ServiceConfig::Heartbeat { .. } => ServiceType::Heartbeat,
            ServiceConfig::Port { .. } => ServiceType::Port,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub nest_id: NestId,
    pub name: String,
    pub target: String,
    pub interval_secs: u32,
    pub config: ServiceConfig,
    pub regions: RegionSelection,
    pub notification_sinks: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Service {
    pub fn service_type(&self) -> ServiceType {
        self.config.service_type()
    }
}

// ---------------------------------------------------------------------
// Scheduler-internal scheduled-service record
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    // Ord derive sorts ascending; scheduler iterates high -> normal -> low,
    // so High must compare greater than Normal/Low.
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledService {
    pub service: Service,
    pub priority: Priority,
    pub next_check_at: DateTime<Utc>,
    pub last_check_at: Option<DateTime<Utc>>,
    pub scheduled: u64,
    pub completed: u64,
    pub failed: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub average_response_time_ms: f64,
    /// Current fingerprint used for dedup; recomputed whenever target/type/config change.
    pub cache_key: String,
}

impl ScheduledService {
    pub fn new(service: Service, cache_key: String, now: DateTime<Utc>) -> Self {
        Self {
            priority: Priority::Normal,
            next_check_at: now,
            last_check_at: None,
            scheduled: 0,
            completed: 0,
            failed: 0,
            last_success_at: None,
            last_failure_at: None,
            average_response_time_ms: 0.0,
            cache_key,
            service,
        }
    }

    /// `(completed - failed) / completed * 100`, or 100 with no samples yet.
    pub fn uptime_percentage(&self) -> f64 {
        if self.completed == 0 {
            return 100.0;
        }
        let up = self.completed.saturating_sub(self.failed) as f64;
        (up / self.completed as f64) * 100.0
    }

    /// Apply an accepted probe outcome to this service's rolling stats.
    pub fn apply_result(&mut self, status: ProbeStatus, response_time_ms: Option<u32>, at: DateTime<Utc>) {
        self.completed += 1;
        match status {
            ProbeStatus::Up | ProbeStatus::Degraded => {
                self.last_success_at = Some(at);
                if let Some(r) = response_time_ms {
                    let n = self.completed as f64;
                    self.average_response_time_ms =
                        (self.average_response_time_ms * (n - 1.0) + r as f64) / n;
                }
            }
            ProbeStatus::Down => {
                self.failed += 1;
                self.last_failure_at = Some(at);
            }
        }
    }
}

// ---------------------------------------------------------------------
// Probe result
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Up,
    Down,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub service_id: ServiceId,
    pub nest_id: NestId,
    pub cache_key: Option<String>,
    pub worker_id: WorkerId,
    pub region: String,
    pub status: ProbeStatus,
    pub response_time_ms: Option<u32>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// Aggregated metrics
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsPeriod {
    Hour,
    Day,
    Month,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub nest_id: NestId,
    pub service_id: ServiceId,
    pub period: MetricsPeriod,
    pub window_start: DateTime<Utc>,
    pub uptime_ratio: f64,
    pub average_response_time_ms: f64,
    pub total_checks: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    pub incident_count: u32,
}

// ---------------------------------------------------------------------
// Incident
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentType {
    Down,
    Degraded,
    Maintenance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub nest_id: NestId,
    pub service_id: ServiceId,
    pub kind: IncidentType,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub affected_checks: u64,
}

impl Incident {
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.resolved_at.map(|end| end - self.started_at)
    }

    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

// ---------------------------------------------------------------------
// Worker registration & state
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub worker_id: WorkerId,
    pub owner_email: String,
    pub hostname: String,
    pub platform: String,
    pub reporting_ip: String,
    pub public_key: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub approver_id: Option<UserId>,
    pub region: String,
    pub broker_username: Option<String>,
    pub broker_password: Option<String>,
    pub revoked: bool,
}

impl WorkerRegistration {
    pub const AUTO_REGION: &'static str = "auto";

    pub fn new(
        worker_id: WorkerId,
        owner_email: String,
        hostname: String,
        platform: String,
        reporting_ip: String,
        public_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            worker_id,
            owner_email,
            hostname,
            platform,
            reporting_ip,
            public_key,
            registered_at: now,
            approved: false,
            approved_at: None,
            approver_id: None,
            region: Self::AUTO_REGION.to_string(),
            broker_username: None,
            broker_password: None,
            revoked: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerLifecycleState {
    Unregistered,
    Pending,
    Approved,
    Active,
    Stale,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerLocation {
    pub continent: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEarnings {
    pub points: f64,
    pub estimated_usd: f64,
    pub estimated_crypto: f64,
}

/// Heartbeat-derived worker state as kept by the verifier (previous-state
/// comparison target) and by the scheduler's `workers:heartbeat` hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerState {
    pub worker_id: WorkerId,
    pub region: String,
    pub version: String,
    pub last_seen: DateTime<Utc>,
    pub checks_completed: u64,
    pub total_points: f64,
    pub current_period_points: f64,
    pub earnings: WorkerEarnings,
    pub location: WorkerLocation,
}

// ---------------------------------------------------------------------
// Users & auth
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Admin,
    Editor,
    Viewer,
    PlatformAdmin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub nest_id: NestId,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub active: bool,
    pub email_verified: bool,
    pub two_factor_secret: Option<String>,
    /// Present only when the nest is in inline-password mode; `None` when
    /// `password_in_secret_manager` is true and the hash lives in the
    /// secret manager instead.
    pub password_hash: Option<String>,
    pub password_in_secret_manager: bool,
    pub created_at: DateTime<Utc>,
}

/// One entry in the last-5 password-change ring kept alongside an
/// externally-stored password hash (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordChangeEvent {
    pub changed_at: DateTime<Utc>,
    /// First 12 hex chars of the new hash, kept for audit display only —
    /// never enough to reconstruct or compare against directly.
    pub hash_prefix: String,
}

/// The record stored at `secrets/users/passwords/<userId>` in the secret
/// manager when a nest has opted into external password storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordRecord {
    pub current_hash: String,
    pub previous_hash: Option<String>,
    pub history: Vec<PasswordChangeEvent>,
}

impl PasswordRecord {
    pub const HISTORY_LIMIT: usize = 5;

    pub fn new(hash: String, at: DateTime<Utc>) -> Self {
        Self {
            history: vec![PasswordChangeEvent {
                changed_at: at,
                hash_prefix: hash.chars().take(12).collect(),
            }],
            current_hash: hash,
            previous_hash: None,
        }
    }

    /// Roll the ring forward: the old current hash becomes the previous
    /// hash (the only one `checkPasswordHistory` compares against), and the
    /// change event is appended, trimmed to the last 5.
    pub fn rotate(&mut self, new_hash: String, at: DateTime<Utc>) {
        self.previous_hash = Some(std::mem::replace(&mut self.current_hash, new_hash));
        self.history.push(PasswordChangeEvent {
            changed_at: at,
            hash_prefix: self.current_hash.chars().take(12).collect(),
        });
        if self.history.len() > Self::HISTORY_LIMIT {
            let excess = self.history.len() - Self::HISTORY_LIMIT;
            self.history.drain(0..excess);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthAttempt {
    pub email: String,
    pub user_id: Option<UserId>,
    pub ip: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub failure_reason: Option<String>,
}

// ---------------------------------------------------------------------
// Message bus envelopes (§6)
// ---------------------------------------------------------------------

pub const COMMAND_CHECK_SERVICE_ONCE: &str = "check_service_once";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeCommandData {
    pub service_id: ServiceId,
    pub nest_id: NestId,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub target: String,
    pub config: ServiceConfig,
    pub regions: Vec<String>,
    pub cache_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeCommand {
    pub command: String,
    pub data: ProbeCommandData,
    pub timestamp: i64,
}

impl ProbeCommand {
    pub fn new(data: ProbeCommandData, timestamp: i64) -> Self {
        Self {
            command: COMMAND_CHECK_SERVICE_ONCE.to_string(),
            data,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResultMessage {
    pub service_id: ServiceId,
    pub nest_id: NestId,
    pub cache_key: Option<String>,
    pub worker_id: WorkerId,
    pub region: String,
    pub status: ProbeStatus,
    pub response_time: Option<u32>,
    pub error: Option<String>,
    pub timestamp: i64,
}

impl From<ProbeResultMessage> for ProbeResult {
    fn from(m: ProbeResultMessage) -> Self {
        ProbeResult {
            service_id: m.service_id,
            nest_id: m.nest_id,
            cache_key: m.cache_key,
            worker_id: m.worker_id,
            region: m.region,
            status: m.status,
            response_time_ms: m.response_time,
            error: m.error,
            timestamp: DateTime::from_timestamp_millis(m.timestamp).unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub worker_id: WorkerId,
    pub region: String,
    pub version: String,
    pub last_seen: i64,
    pub checks_completed: u64,
    pub total_points: f64,
    pub current_period_points: f64,
    pub earnings: WorkerEarnings,
    pub location: WorkerLocation,
    pub timestamp: i64,
    pub signature: Option<String>,
}

// ---------------------------------------------------------------------
// Billing (§4.5 key scheme: `billing:<billingId>`)
// ---------------------------------------------------------------------

/// Minimal billing record backing the `billing:<billingId>` key named in
/// §4.5's key scheme but not otherwise detailed by §3's data model — a
/// nest's tier and its expiry are the only billing facts the core itself
/// reads (`SubscriptionTier::quota`); everything else (invoices, payment
/// method) belongs to the out-of-scope admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingRecord {
    pub id: String,
    pub nest_id: NestId,
    pub tier: SubscriptionTier,
    pub renews_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// Scheduler global counters
// ---------------------------------------------------------------------

/// Cumulative scheduler counters kept at `scheduler:stats:global`
/// (§4.1 step 3 "flush global counters"). Best-effort: a storage failure
/// while flushing these never blocks the tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GlobalStats {
    pub ticks: u64,
    pub dispatched: u64,
    pub cache_hits: u64,
    pub publish_failures: u64,
}

/// Live-fan-out event published on `sse:<nestId>` (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SseEvent {
    ServiceUpdate {
        service_id: ServiceId,
        status: ProbeStatus,
        response_time: Option<u32>,
        timestamp: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_service() -> Service {
        Service {
            id: "s1".into(),
            nest_id: "n1".into(),
            name: "test".into(),
            target: "https://example.com".into(),
            interval_secs: 30,
            config: ServiceConfig::Ping,
            regions: RegionSelection::default(),
            notification_sinks: vec![],
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn priority_orders_high_first() {
        let mut v = vec![Priority::Low, Priority::High, Priority::Normal];
        v.sort_by(|a, b| b.cmp(a));
        assert_eq!(v, vec![Priority::High, Priority::Normal, Priority::Low]);
    }

    #[test]
    fn uptime_percentage_with_no_samples_is_100() {
        let scheduled = ScheduledService::new(sample_service(), "ck".into(), Utc::now());
        assert_eq!(scheduled.uptime_percentage(), 100.0);
    }

    #[test]
    fn apply_result_updates_moving_average() {
        let mut scheduled = ScheduledService::new(sample_service(), "ck".into(), Utc::now());
        scheduled.apply_result(ProbeStatus::Up, Some(100), Utc::now());
        scheduled.apply_result(ProbeStatus::Up, Some(200), Utc::now());
        assert_eq!(scheduled.completed, 2);
        assert_eq!(scheduled.failed, 0);
        assert_eq!(scheduled.average_response_time_ms, 150.0);
        assert_eq!(scheduled.uptime_percentage(), 100.0);
    }

    #[test]
    fn apply_result_counts_failures_into_uptime() {
        let mut scheduled = ScheduledService::new(sample_service(), "ck".into(), Utc::now());
        scheduled.apply_result(ProbeStatus::Up, Some(100), Utc::now());
        scheduled.apply_result(ProbeStatus::Down, None, Utc::now());
        assert_eq!(scheduled.completed, 2);
        assert_eq!(scheduled.failed, 1);
        assert_eq!(scheduled.uptime_percentage(), 50.0);
    }

    #[test]
    fn probe_result_message_converts_timestamp() {
        let msg = ProbeResultMessage {
            service_id: "s1".into(),
            nest_id: "n1".into(),
            cache_key: Some("ck".into()),
            worker_id: "w1".into(),
            region: "us-east-1".into(),
            status: ProbeStatus::Up,
            response_time: Some(42),
            error: None,
            timestamp: 1_700_000_000_000,
        };
        let result: ProbeResult = msg.into();
        assert_eq!(result.response_time_ms, Some(42));
    }
}
