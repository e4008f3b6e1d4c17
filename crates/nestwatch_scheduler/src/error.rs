//! Internal scheduler error type, mapped to `nestwatch_protocol::CoreError`
//! at the boundary (the one that would exist if this core exposed a direct
//! scheduler-facing API; internally, scheduler/fleet map their own errors
//! into logging rather than a caller per §7's propagation policy).

use nestwatch_protocol::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("storage error: {0}")]
    Storage(#[from] nestwatch_storage::StorageError),

    #[error("fleet error: {0}")]
    Fleet(#[from] nestwatch_fleet::FleetError),

    #[error("bus error: {0}")]
    Bus(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<lapin::Error> for SchedulerError {
    fn from(err: lapin::Error) -> Self {
        SchedulerError::Bus(err.to_string())
    }
}

impl From<SchedulerError> for CoreError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Storage(e) => CoreError::Transient(e.to_string()),
            SchedulerError::Bus(e) => CoreError::Transient(e),
            SchedulerError::Fleet(e) => e.into(),
            SchedulerError::Serialization(e) => CoreError::Validation(e.to_string()),
        }
    }
}
