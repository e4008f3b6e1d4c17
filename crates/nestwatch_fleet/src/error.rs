//! Internal fleet error type, mapped to `nestwatch_protocol::CoreError` at
//! the boundary (the registration HTTP server, the scheduler's heartbeat
//! listener) the way `nestwatch_auth::AuthError` maps for the login path.

use nestwatch_protocol::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FleetError>;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("registration rate limit exceeded for this address")]
    RateLimited,

    /// Heartbeat failed one of the five anti-fraud gates. Never surfaced
    /// with a reason to the worker — §7 requires this be dropped silently.
    #[error("heartbeat rejected: {0}")]
    Integrity(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] nestwatch_storage::StorageError),
}

impl From<FleetError> for CoreError {
    fn from(err: FleetError) -> Self {
        match err {
            FleetError::Validation(msg) => CoreError::Validation(msg),
            FleetError::NotFound(msg) => CoreError::NotFound(msg),
            FleetError::Conflict(msg) => CoreError::Conflict(msg),
            FleetError::RateLimited => CoreError::RateLimited {
                retry_after_secs: 3600,
                locked: false,
                lockout_expires_at: None,
            },
            FleetError::Integrity(_) => CoreError::Integrity,
            FleetError::Storage(e) => CoreError::Transient(e.to_string()),
        }
    }
}
