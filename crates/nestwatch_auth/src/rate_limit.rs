//! Login rate limiting and account lockout (§4.6 step 2).

use chrono::{DateTime, Duration, Utc};
use nestwatch_protocol::config::{LoginAttemptsConfig, SecurityConfig};
use nestwatch_protocol::keys;
use nestwatch_storage::Store;
use rand::RngCore;

use crate::error::{AuthError, Result};

pub struct RateLimiter {
    store: Store,
    attempts: LoginAttemptsConfig,
    security: SecurityConfig,
}

impl RateLimiter {
    pub fn new(store: Store, attempts: LoginAttemptsConfig, security: SecurityConfig) -> Self {
        Self {
            store,
            attempts,
            security,
        }
    }

    /// Record a failed login attempt for `email` at `at`.
    pub async fn record_failure(&self, email: &str, at: DateTime<Utc>) -> Result<()> {
        let key = keys::auth_attempts(email);
        let member = format!("{}-{:x}", at.timestamp_millis(), rand::thread_rng().next_u32());
        self.store
            .backend_ref()
            .zadd(&key, &member, at.timestamp_millis() as f64)
            .await?;
        // Best-effort trim: the key only needs to outlive the widest
        // window any caller checks against.
        let window_secs = (self.attempts.window_ms / 1000).max(1) as u64;
        self.store.backend_ref().expire(&key, window_secs).await?;
        Ok(())
    }

    /// Clear recorded failures for `email`, called on a successful login.
    pub async fn clear(&self, email: &str) -> Result<()> {
        self.store.backend_ref().delete(&keys::auth_attempts(email)).await?;
        Ok(())
    }

    /// Count failures within the configured window and decide whether the
    /// account is locked. Returns `Err(AccountLocked)` when the threshold
    /// is met or exceeded.
    pub async fn check(&self, email: &str, now: DateTime<Utc>) -> Result<()> {
        let window_start = now - Duration::milliseconds(self.attempts.window_ms);
        let key = keys::auth_attempts(email);
        let recent = self
            .store
            .backend_ref()
            .zrangebyscore(&key, window_start.timestamp_millis() as f64, now.timestamp_millis() as f64)
            .await?;

        if recent.len() as u32 >= self.attempts.max_attempts {
            let lockout_expires_at = now + Duration::seconds(self.security.lockout_duration_secs);
            return Err(AuthError::AccountLocked { lockout_expires_at });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestwatch_storage::memory_backend::MemoryBackend;
    use std::sync::Arc;

    fn limiter(max_attempts: u32) -> RateLimiter {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        RateLimiter::new(
            store,
            LoginAttemptsConfig {
                max_attempts,
                window_ms: 60_000,
            },
            SecurityConfig {
                lockout_duration_secs: 900,
            },
        )
    }

    #[tokio::test]
    async fn allows_attempts_under_the_threshold() {
        let limiter = limiter(3);
        let now = Utc::now();
        limiter.record_failure("u@test", now).await.unwrap();
        limiter.record_failure("u@test", now).await.unwrap();
        assert!(limiter.check("u@test", now).await.is_ok());
    }

    #[tokio::test]
    async fn locks_out_after_reaching_max_attempts() {
        let limiter = limiter(3);
        let now = Utc::now();
        for _ in 0..3 {
            limiter.record_failure("u@test", now).await.unwrap();
        }
        let err = limiter.check("u@test", now).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked { .. }));
    }

    #[tokio::test]
    async fn clear_resets_the_counter() {
        let limiter = limiter(1);
        let now = Utc::now();
        limiter.record_failure("u@test", now).await.unwrap();
        limiter.clear("u@test").await.unwrap();
        assert!(limiter.check("u@test", now).await.is_ok());
    }
}
