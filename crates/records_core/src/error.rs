use std::time::Duration;
use thiserror::Error;

/// Failure of a single store call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("revision mismatch (expected={expected}, actual={actual})")]
    RevisionMismatch { expected: i64, actual: i64 },

    #[error("unknown id")]
    UnknownId,

    #[error("{0}")]
    Unavailable(String),
}

/// Errors surfaced by the achievement coordinator and attachment handler.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordsError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{context} failed")]
    Persistence {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl RecordsError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Wraps a store failure raised while performing `context`.
    pub fn persistence(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Persistence { context, source }
    }
}

pub type Result<T, E = RecordsError> = std::result::Result<T, E>;
