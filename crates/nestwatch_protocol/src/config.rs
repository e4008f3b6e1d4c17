//! Recognized configuration surface (§6 "Configuration").
//!
//! Every process in the core (`nestwatch`, `nestwatch-worker`) loads one of
//! these from TOML/env and passes it down as an explicit collaborator —
//! there is no global singleton reading environment variables ad hoc.

use serde::Deserialize;

use crate::defaults::*;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
        }
    }
}

impl RedisConfig {
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(pw) => format!("redis://:{pw}@{}:{}", self.host, self.port),
            None => format!("redis://{}:{}", self.host, self.port),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_ms: u64,
    pub dedup_ttl_sec: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            dedup_ttl_sec: DEFAULT_DEDUP_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerFleetConfig {
    pub heartbeat_timeout_ms: u64,
}

impl Default for WorkerFleetConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            access_ttl_secs: DEFAULT_JWT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_JWT_REFRESH_TTL_SECS,
            issuer: "nestwatch".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub bcrypt_cost: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_PASSWORD_MIN_LENGTH,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoginAttemptsConfig {
    pub max_attempts: u32,
    pub window_ms: i64,
}

impl Default for LoginAttemptsConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_LOGIN_MAX_ATTEMPTS,
            window_ms: DEFAULT_LOGIN_WINDOW_SECS * 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub login_attempts: LoginAttemptsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub lockout_duration_secs: i64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            lockout_duration_secs: DEFAULT_LOCKOUT_DURATION_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub rate_limiting: RateLimitingConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Optional shared token required via `X-Registration-Token`.
    pub token: Option<String>,
    pub max_per_ip_per_hour: Option<u32>,
}

impl RegistrationConfig {
    pub fn effective_max_per_ip_per_hour(&self) -> u32 {
        self.max_per_ip_per_hour
            .unwrap_or(DEFAULT_MAX_REGISTRATIONS_PER_IP_PER_HOUR)
    }
}

/// Canonical system configuration loaded by every core binary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub redis: RedisConfig,
    pub rabbitmq_url: String,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerFleetConfig,
    pub auth: AuthConfig,
    pub registration: RegistrationConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_config_formats_connection_url_with_password() {
        let cfg = RedisConfig {
            host: "cache.internal".into(),
            port: 6380,
            password: Some("hunter2".into()),
        };
        assert_eq!(cfg.connection_url(), "redis://:hunter2@cache.internal:6380");
    }

    #[test]
    fn defaults_match_spec_table() {
        let cfg = SystemConfig::default();
        assert_eq!(cfg.scheduler.tick_ms, 5000);
        assert_eq!(cfg.scheduler.dedup_ttl_sec, 30);
        assert_eq!(cfg.worker.heartbeat_timeout_ms, 120_000);
    }
}
