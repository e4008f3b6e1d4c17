//! The login algorithm (§4.6), steps 1-5.

use chrono::Utc;
use nestwatch_protocol::types::{AuthAttempt, UserRole};
use nestwatch_storage::Store;

use crate::error::{AuthError, Result};
use crate::jwt::{Session, TokenIssuer};
use crate::password::PasswordBackend;
use crate::rate_limit::RateLimiter;

/// A bcrypt hash of a fixed, never-issued password. Verifying against it
/// when no such user exists keeps the unknown-user path costing roughly
/// the same wall-clock time as a wrong-password path, so neither is
/// distinguishable by timing (§4.6 step 1).
const DUMMY_HASH: &str = "$2b$10$EixZaYVK1fsbw1ZfbX3OXePaWxn96p36WQoeG6Lruj3vjPGga31lW";

pub struct LoginOutcome {
    pub session: Option<Session>,
    pub requires_two_factor: bool,
}

pub struct LoginService {
    store: Store,
    password_backend: PasswordBackend,
    token_issuer: TokenIssuer,
    rate_limiter: RateLimiter,
}

impl LoginService {
    pub fn new(
        store: Store,
        password_backend: PasswordBackend,
        token_issuer: TokenIssuer,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            store,
            password_backend,
            token_issuer,
            rate_limiter,
        }
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: &str,
        user_agent: &str,
    ) -> Result<LoginOutcome> {
        let now = Utc::now();

        // Step 1: load user by email (may not exist — handled uniformly below).
        let user = self.store.get_user_by_email(email).await?;

        // Step 2: rate limit / lockout check, before spending bcrypt cycles.
        self.rate_limiter.check(email, now).await?;

        // Step 3: verify password against whichever store backs this user.
        // Always run a bcrypt verify, even with no user, to equalize timing.
        let verified = match &user {
            Some(u) => self.password_backend.verify(u, password).await.unwrap_or(false),
            None => {
                let _ = bcrypt::verify(password, DUMMY_HASH);
                false
            }
        };

        self.record_attempt(email, user.as_ref().map(|u| u.id.clone()), ip, user_agent, verified)
            .await?;

        if !verified {
            self.rate_limiter.record_failure(email, now).await?;
            return Err(AuthError::InvalidCredentials);
        }

        let user = user.ok_or(AuthError::InvalidCredentials)?;
        self.rate_limiter.clear(email).await?;

        // Step 4: 2FA gate.
        if user.two_factor_secret.is_some() {
            return Ok(LoginOutcome {
                session: None,
                requires_two_factor: true,
            });
        }

        // Step 5: issue session.
        let session = self
            .token_issuer
            .issue_session(&user.id, &user.nest_id, role(user.role))?;
        Ok(LoginOutcome {
            session: Some(session),
            requires_two_factor: false,
        })
    }

    async fn record_attempt(
        &self,
        email: &str,
        user_id: Option<String>,
        ip: &str,
        user_agent: &str,
        success: bool,
    ) -> Result<()> {
        let attempt = AuthAttempt {
            email: email.to_string(),
            user_id,
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            timestamp: Utc::now(),
            success,
            failure_reason: if success {
                None
            } else {
                Some("invalid credentials".to_string())
            },
        };
        let audit_id = uuid::Uuid::new_v4().to_string();
        self.store.record_auth_attempt(&audit_id, &attempt).await?;
        Ok(())
    }
}

fn role(role: UserRole) -> UserRole {
    role
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestwatch_protocol::config::{JwtConfig, LoginAttemptsConfig, SecurityConfig};
    use nestwatch_protocol::types::User;
    use nestwatch_storage::memory_backend::MemoryBackend;
    use std::sync::Arc;

    async fn service_with_user(password: &str) -> (LoginService, User) {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let backend = PasswordBackend::inline(4);

        let mut user = User {
            id: "u1".into(),
            nest_id: "n1".into(),
            email: "owner@acme.test".into(),
            display_name: "Owner".into(),
            role: UserRole::Owner,
            active: true,
            email_verified: true,
            two_factor_secret: None,
            password_hash: None,
            password_in_secret_manager: false,
            created_at: Utc::now(),
        };
        backend.set_password(&mut user, password).await.unwrap();
        store.put_user(&user).await.unwrap();

        let issuer = TokenIssuer::new(JwtConfig::default(), b"test-secret");
        let limiter = RateLimiter::new(
            store.clone(),
            LoginAttemptsConfig {
                max_attempts: 3,
                window_ms: 60_000,
            },
            SecurityConfig {
                lockout_duration_secs: 900,
            },
        );

        (LoginService::new(store, backend, issuer, limiter), user)
    }

    #[tokio::test]
    async fn correct_password_issues_a_session() {
        let (service, user) = service_with_user("correct horse battery").await;
        let outcome = service
            .login(&user.email, "correct horse battery", "127.0.0.1", "test-agent")
            .await
            .unwrap();
        assert!(outcome.session.is_some());
        assert!(!outcome.requires_two_factor);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_uniformly_with_unknown_user() {
        let (service, user) = service_with_user("correct horse battery").await;

        let wrong = service
            .login(&user.email, "wrong", "127.0.0.1", "test-agent")
            .await
            .unwrap_err();
        assert!(matches!(wrong, AuthError::InvalidCredentials));

        let unknown = service
            .login("nobody@acme.test", "whatever", "127.0.0.1", "test-agent")
            .await
            .unwrap_err();
        assert!(matches!(unknown, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn two_factor_enabled_short_circuits_session_issuance() {
        let (service, mut user) = service_with_user("correct horse battery").await;
        user.two_factor_secret = Some(crate::totp::generate_secret());
        service.store.put_user(&user).await.unwrap();

        let outcome = service
            .login(&user.email, "correct horse battery", "127.0.0.1", "test-agent")
            .await
            .unwrap();
        assert!(outcome.session.is_none());
        assert!(outcome.requires_two_factor);
    }

    #[tokio::test]
    async fn repeated_failures_lock_the_account() {
        let (service, user) = service_with_user("correct horse battery").await;
        for _ in 0..3 {
            let _ = service
                .login(&user.email, "wrong", "127.0.0.1", "test-agent")
                .await;
        }
        let err = service
            .login(&user.email, "correct horse battery", "127.0.0.1", "test-agent")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked { .. }));
    }
}
