//! Internal auth error type, mapped to `nestwatch_protocol::CoreError` at
//! the boundary every caller outside this crate actually sees.

use nestwatch_protocol::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account locked until {lockout_expires_at}")]
    AccountLocked {
        lockout_expires_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("two-factor code required")]
    TwoFactorRequired,

    #[error("invalid two-factor code")]
    InvalidTwoFactorCode,

    #[error("password matches a recently used password")]
    PasswordReused,

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("secret manager error: {0}")]
    SecretManager(String),

    #[error("storage error: {0}")]
    Storage(#[from] nestwatch_storage::StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AuthError> for CoreError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::TwoFactorRequired
            | AuthError::InvalidTwoFactorCode
            | AuthError::PasswordReused => CoreError::Validation(err.to_string()),
            AuthError::AccountLocked { lockout_expires_at } => CoreError::RateLimited {
                retry_after_secs: (lockout_expires_at - chrono::Utc::now()).num_seconds().max(0),
                locked: true,
                lockout_expires_at: Some(lockout_expires_at),
            },
            AuthError::Token(_) => CoreError::Authorization,
            other => CoreError::Transient(other.to_string()),
        }
    }
}
