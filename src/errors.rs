use thiserror::Error;

/// Engine-level failure taxonomy. Row-level callers (interactive entry, the
/// bulk importer) convert `Validation`/`NotFound` into reported outcomes;
/// `Inconsistency` and `Store` always abort the enclosing transaction.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Inconsistency(String),
    #[error("store failure: {0}")]
    Store(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        EngineError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        EngineError::Conflict(message.into())
    }

    pub fn inconsistency(message: impl Into<String>) -> Self {
        EngineError::Inconsistency(message.into())
    }

    /// Stable wire code for the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict(_) => "conflict",
            EngineError::Inconsistency(_) => "aggregation_inconsistency",
            EngineError::Store(_) => "store_failure",
        }
    }

    /// Row-level errors reject one unit of input; everything else must roll
    /// back the whole unit of work.
    pub fn is_row_level(&self) -> bool {
        matches!(self, EngineError::Validation(_) | EngineError::NotFound(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
