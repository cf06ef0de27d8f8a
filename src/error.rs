use crate::data::AllocationId;
use std::fmt;
use thiserror::Error;

/// Why an allocation could not be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfeasibleReason {
    NoAllowedDays,
    ZeroDuration,
    WindowTooNarrow,
    NoEligibleVenue,
    NoFreeWindow,
}

impl fmt::Display for InfeasibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InfeasibleReason::NoAllowedDays => "no allowed days",
            InfeasibleReason::ZeroDuration => "session has no duration",
            InfeasibleReason::WindowTooNarrow => "daily window is shorter than the session",
            InfeasibleReason::NoEligibleVenue => "no venue matches the required type and capacity",
            InfeasibleReason::NoFreeWindow => "no free window left in any eligible venue on any allowed day",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("allocation {allocation_id} cannot be placed: {reason}")]
    Infeasible {
        allocation_id: AllocationId,
        reason: InfeasibleReason,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned: {0}")]
    Lock(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("corrupt {column} value: {message}")]
    Corrupt { column: &'static str, message: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt {
            column: "json",
            message: e.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("planning worker failed: {0}")]
    Worker(String),
}
