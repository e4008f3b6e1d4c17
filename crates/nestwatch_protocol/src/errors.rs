//! Error taxonomy shared by every API-facing collaborator (§7).
//!
//! Internal crates (scheduler, storage) use their own error enums for
//! control flow; this type is the stable shape they get mapped into at the
//! boundary so callers always see `{success: false, error: ...}` without a
//! stack trace crossing the wire.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authorization error")]
    Authorization,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited")]
    RateLimited {
        retry_after_secs: i64,
        locked: bool,
        lockout_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    },

    #[error("transient infrastructure error: {0}")]
    Transient(String),

    /// Heartbeat/signature integrity failure. Never surfaced with detail —
    /// the caller is potentially a fraudulent worker, not a debuggable client.
    #[error("integrity check failed")]
    Integrity,

    #[error("internal error (correlation_id={correlation_id}): {message}")]
    Fatal {
        correlation_id: String,
        message: String,
    },
}

impl CoreError {
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            CoreError::Authorization => 401,
            CoreError::NotFound(_) => 404,
            CoreError::Conflict(_) => 409,
            CoreError::RateLimited { .. } => 429,
            CoreError::Transient(_) => 503,
            CoreError::Integrity => 200, // dropped silently, never surfaced as an error body
            CoreError::Fatal { .. } => 500,
        }
    }

    /// Render the stable `{success: false, error: ...}` envelope. Returns
    /// `None` for `Integrity`, which the spec requires to be dropped
    /// silently rather than answered at all.
    pub fn to_envelope(&self) -> Option<ErrorEnvelope> {
        match self {
            CoreError::Integrity => None,
            CoreError::RateLimited {
                locked,
                lockout_expires_at,
                ..
            } => Some(ErrorEnvelope {
                success: false,
                error: self.to_string(),
                is_account_locked: Some(*locked),
                lockout_expires_at: *lockout_expires_at,
            }),
            _ => Some(ErrorEnvelope {
                success: false,
                error: self.to_string(),
                is_account_locked: None,
                lockout_expires_at: None,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_account_locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout_expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_errors_render_no_envelope() {
        assert!(CoreError::Integrity.to_envelope().is_none());
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(CoreError::NotFound("service".into()).status_code(), 404);
    }

    #[test]
    fn rate_limited_envelope_carries_lockout_metadata() {
        let err = CoreError::RateLimited {
            retry_after_secs: 900,
            locked: true,
            lockout_expires_at: Some(chrono::Utc::now()),
        };
        let env = err.to_envelope().unwrap();
        assert_eq!(env.is_account_locked, Some(true));
        assert!(!env.success);
    }
}
