// src/error.rs

use std::fmt;

/// Global Application Error Enum.
/// Every layer of the scoring pipeline returns this type and propagates it with `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    // Exam instance, section or conversion table absent
    NotFound(String),

    // SCALE without a resolvable table, malformed scoring config, bad env
    ConfigurationError(String),

    // Connectivity / write failure on the backing store
    StorageError(String),

    // Invalid conversion-table input
    BadRequest(String),

    // Duplicate (category, correct count) pair
    Conflict(String),

    // Scoring task panicked or timed out
    InternalServerError(String),
}

impl AppError {
    /// True for failures that may succeed on a later attempt (next process start
    /// or a manual recalculation).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::StorageError(_) | AppError::InternalServerError(_)
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "not found: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "configuration error: {}", msg),
            AppError::StorageError(msg) => write!(f, "storage error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "bad request: {}", msg),
            AppError::Conflict(msg) => write!(f, "conflict: {}", msg),
            AppError::InternalServerError(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts `sqlx::Error` into `AppError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
            other => AppError::StorageError(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ConfigurationError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
