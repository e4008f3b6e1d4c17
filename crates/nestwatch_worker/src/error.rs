//! Worker-internal error type.
//!
//! The worker has no API-facing boundary of its own (it's a bus/HTTP
//! client, never a server), so unlike the core crates there is no mapping
//! into `nestwatch_protocol::CoreError` here — errors either get logged and
//! retried, or bubble out of `main` as a startup failure.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("registration request failed: {0}")]
    Registration(#[from] reqwest::Error),

    #[error("bus error: {0}")]
    Bus(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("registration was rejected or revoked")]
    NotApproved,
}

impl From<lapin::Error> for WorkerError {
    fn from(err: lapin::Error) -> Self {
        WorkerError::Bus(err.to_string())
    }
}
