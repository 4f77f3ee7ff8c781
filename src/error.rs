//! Tagged error taxonomy for the engine's public boundary.
//!
//! The signal kernel and data processor never raise: non-finite inputs and
//! empty windows are handled locally (NaN propagation, empty vectors) and
//! never surface as an `Err`. Everything at or above the cache store /
//! orchestrator boundary returns one of these variants.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorridorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no cached entry for query id")]
    NotFound,

    /// Not a failure in the flow sense — an explicit freshness signal.
    #[error("cached entry is stale")]
    Stale,

    #[error("metric source did not answer within retries: {0}")]
    UpstreamUnavailable(String),

    #[error("metric source returned {status}: {body}")]
    UpstreamBadResponse { status: u16, body: String },

    #[error("timed out waiting on a build lease held by another worker")]
    LeaseTimeout,

    #[error("store constraint violated: {0}")]
    StoreConflict(String),

    #[error("cached payload failed schema validation: {0}")]
    Corruption(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for CorridorError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CorridorError::StoreConflict(err.to_string())
            }
            other => CorridorError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CorridorError {
    fn from(e: serde_json::Error) -> Self {
        CorridorError::Corruption(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CorridorError>;
