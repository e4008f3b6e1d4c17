//! Storage error taxonomy.
//!
//! Kept distinct from `nestwatch_protocol::CoreError` — callers at the API
//! boundary map these into the stable envelope, but storage internals need
//! finer-grained variants (cross-tenant access, degraded-mode signaling)
//! that have no business leaking past the layer that catches them.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    /// A lookup under one nest resolved to a record owned by another.
    #[error("cross-tenant access denied: record {record_id} does not belong to nest {nest_id}")]
    CrossTenant { nest_id: String, record_id: String },

    /// Creating/activating a service would push a nest's active-service
    /// count past its subscription tier's quota (§3).
    #[error("nest {nest_id} has reached its quota of {quota} active services")]
    QuotaExceeded { nest_id: String, quota: u32 },
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        StorageError::Backend(err.to_string())
    }
}
