//! Error types for ephemail.

use thiserror::Error;

/// Common error type for ephemail.
#[derive(Error, Debug)]
pub enum EphemailError {
    /// Database error.
    ///
    /// Any persistence failure that is not a uniqueness conflict. Callers
    /// should treat it as transient.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for malformed input (addresses, recipients, payloads).
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Resource exists but its lifetime has passed.
    #[error("{0} has expired")]
    Expired(String),

    /// Uniqueness constraint violation reported by the store.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Address allocation gave up after the given number of attempts.
    #[error("address allocation exhausted after {0} attempts")]
    AllocationExhausted(u32),

    /// MIME payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// TLS certificate or handshake error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Unexpected failure inside the process, such as a panicked worker task.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EphemailError {
    /// Whether the failure is transient and the operation may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EphemailError::Database(_)
                | EphemailError::DatabaseConnection(_)
                | EphemailError::Internal(_)
        )
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for EphemailError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                EphemailError::Conflict(db_err.message().to_string())
            }
            _ => EphemailError::Database(e.to_string()),
        }
    }
}

/// Result type alias for ephemail operations.
pub type Result<T> = std::result::Result<T, EphemailError>;
