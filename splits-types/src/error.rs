//! Error types for the payment split service.

use crate::domain::{PaymentId, PaymentStatus};

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Amount {0} does not fit in minor currency units")]
    AmountOverflow(String),

    #[error("Percentage must be between 0 and 1, got {0}")]
    InvalidPercentage(String),

    #[error("Invalid payment transition: {from} -> {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Data store unavailable: {0}")]
    Unavailable(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Limit reached: {0}")]
    LimitReached(String),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream processor error: {0}")]
    Upstream(String),

    #[error("Data store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::PaymentNotFound(id) => AppError::NotFound(format!("Payment {}", id)),
            DomainError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            DomainError::ValidationError(msg) => AppError::BadRequest(msg),
            e => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Unavailable(e) => AppError::StoreUnavailable(e),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
            RepoError::LimitReached(e) => AppError::BadRequest(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_store_maps_to_store_unavailable() {
        let err: AppError = RepoError::Unavailable("pool timed out".into()).into();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
    }

    #[test]
    fn test_limit_reached_maps_to_bad_request() {
        let err: AppError = RepoError::LimitReached("rule cap".into()).into();
        assert!(matches!(err, AppError::BadRequest(m) if m == "rule cap"));
    }

    #[test]
    fn test_invalid_transition_maps_to_conflict() {
        let err: AppError = RepoError::Domain(DomainError::InvalidTransition {
            from: PaymentStatus::Failed,
            to: PaymentStatus::Completed,
        })
        .into();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
