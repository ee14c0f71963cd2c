use rusqlite::ErrorCode;

use crate::db::Table;

/// Errors reported by [`crate::census::CensusService`]. Callers can tell a
/// missing record apart from a rejected write without parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum CensusError {
    #[error("{table} record {id} not found")]
    NotFound { table: Table, id: i64 },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(anyhow::Error),
}

pub type CensusResult<T> = std::result::Result<T, CensusError>;

impl From<anyhow::Error> for CensusError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<CensusError>() {
            Ok(census) => return census,
            Err(err) => err,
        };
        let constraint = err.chain().find_map(|cause| match cause.downcast_ref::<rusqlite::Error>() {
            Some(rusqlite::Error::SqliteFailure(e, msg)) if e.code == ErrorCode::ConstraintViolation => {
                Some(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => None,
        });
        match constraint {
            Some(message) => CensusError::ConstraintViolation(message),
            None => CensusError::Storage(err),
        }
    }
}

impl From<rusqlite::Error> for CensusError {
    fn from(err: rusqlite::Error) -> Self {
        CensusError::from(anyhow::Error::from(err))
    }
}
