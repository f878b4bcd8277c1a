//! Error types for metget services.

use thiserror::Error;

/// Result type alias using MetGetError.
pub type MetGetResult<T> = Result<T, MetGetError>;

/// Primary error type for metget operations.
#[derive(Debug, Error)]
pub enum MetGetError {
    // === Request validation ===
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    // === Authorization ===
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Insufficient credit: requested {requested}, remaining {remaining}")]
    CreditDenied { requested: i64, remaining: i64 },

    #[error("Request not found: {0}")]
    RequestNotFound(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    // === Data availability ===
    #[error("No data available: {0}")]
    CoverageGap(String),

    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    // === Infrastructure ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MetGetError {
    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            MetGetError::Validation(_)
            | MetGetError::MissingField(_)
            | MetGetError::UnknownService(_)
            | MetGetError::UnsupportedFormat(_) => 400,

            MetGetError::Unauthorized => 401,
            MetGetError::CreditDenied { .. } => 402,
            MetGetError::Forbidden(_) => 403,
            MetGetError::RequestNotFound(_) => 404,
            MetGetError::RateLimited => 429,

            MetGetError::CoverageGap(_) => 422,
            MetGetError::Upstream(_) => 502,

            _ => 500,
        }
    }

    /// Whether a worker should treat this failure as retryable.
    ///
    /// Transient failures leave the queue envelope unacknowledged so the
    /// broker redelivers it; permanent failures terminate the request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MetGetError::Upstream(_)
                | MetGetError::Database(_)
                | MetGetError::Storage(_)
                | MetGetError::Queue(_)
        )
    }
}

impl From<std::io::Error> for MetGetError {
    fn from(err: std::io::Error) -> Self {
        MetGetError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for MetGetError {
    fn from(err: serde_json::Error) -> Self {
        MetGetError::Validation(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(MetGetError::Unauthorized.http_status_code(), 401);
        assert_eq!(
            MetGetError::CreditDenied {
                requested: 10,
                remaining: 5
            }
            .http_status_code(),
            402
        );
        assert_eq!(
            MetGetError::RequestNotFound("x".into()).http_status_code(),
            404
        );
        assert_eq!(MetGetError::Validation("x".into()).http_status_code(), 400);
        assert_eq!(MetGetError::Internal("x".into()).http_status_code(), 500);
    }

    #[test]
    fn test_transient_classification() {
        assert!(MetGetError::Upstream("timeout".into()).is_transient());
        assert!(MetGetError::Storage("put failed".into()).is_transient());
        assert!(!MetGetError::CoverageGap("hole".into()).is_transient());
        assert!(!MetGetError::Validation("bad".into()).is_transient());
    }
}
