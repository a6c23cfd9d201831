// Error types for checkout and order lifecycle operations.
// Customer-facing rejections are carried as values inside `Rejected`; every
// other variant is a failure of the request or of the system.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::checkout::models::RejectionDetails;
use crate::coupons::{CouponConfigError, CouponError};
use crate::db;
use crate::error::ErrorResponse;
use crate::orders::OrderError;
use crate::rejection::RejectionReason;
use crate::stock::StockError;

#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A business rule refused the checkout; nothing was written
    #[error("Checkout rejected: {reason}")]
    Rejected {
        reason: RejectionReason,
        details: RejectionDetails,
    },

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// COMMIT was sent but did not report success; the write may or may not be durable
    #[error("Commit outcome unknown: {0}")]
    CommitOutcomeUnknown(sqlx::Error),

    #[error("Checkout attempt timed out")]
    Timeout,

    #[error("Checkout could not complete after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Stored data contradicts itself; refused and left for an operator
    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Coupon misconfigured: {0}")]
    CouponConfig(#[from] CouponConfigError),
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;

impl CheckoutError {
    pub fn rejected(reason: RejectionReason) -> Self {
        CheckoutError::Rejected {
            reason,
            details: RejectionDetails::default(),
        }
    }

    /// Whether a fresh transaction may succeed where this one failed
    pub fn is_transient(&self) -> bool {
        match self {
            CheckoutError::Database(e) => db::is_transient(e),
            CheckoutError::Timeout => true,
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CheckoutError::Rejected { .. } => StatusCode::CONFLICT,
            CheckoutError::Validation(_) | CheckoutError::InvalidInput(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CheckoutError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            CheckoutError::InvalidTransition(_) => StatusCode::CONFLICT,
            CheckoutError::Timeout | CheckoutError::RetriesExhausted { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CheckoutError::Database(_)
            | CheckoutError::CommitOutcomeUnknown(_)
            | CheckoutError::Invariant(_)
            | CheckoutError::CouponConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CouponError> for CheckoutError {
    fn from(err: CouponError) -> Self {
        match err {
            CouponError::Database(e) => CheckoutError::Database(e),
            CouponError::Config(e) => CheckoutError::CouponConfig(e),
            other @ (CouponError::Missing(_) | CouponError::CounterMismatch { .. }) => {
                CheckoutError::Invariant(other.to_string())
            }
        }
    }
}

impl From<StockError> for CheckoutError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::Database(e) => CheckoutError::Database(e),
            StockError::QuantityOverflow { .. } => CheckoutError::InvalidInput(err.to_string()),
            StockError::NegativeAvailable { .. } => CheckoutError::Invariant(err.to_string()),
        }
    }
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Database(e) => CheckoutError::Database(e),
            OrderError::NotFound(id) => CheckoutError::OrderNotFound(id),
            OrderError::InvalidTransition(msg) => CheckoutError::InvalidTransition(msg),
        }
    }
}

/// Body of a 409 rejection
#[derive(Debug, Serialize, ToSchema)]
pub struct RejectionResponse {
    pub error_code: String,
    pub reason: RejectionReason,
    pub message: String,
    pub details: RejectionDetails,
    pub timestamp: String,
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let timestamp = Utc::now().to_rfc3339();

        let (error_code, message, details) = match self {
            CheckoutError::Rejected { reason, details } => {
                tracing::debug!(reason = reason.code(), "Checkout rejected");
                let body = RejectionResponse {
                    error_code: reason.code().to_string(),
                    reason,
                    message: reason.message().to_string(),
                    details,
                    timestamp,
                };
                return (status, Json(body)).into_response();
            }
            CheckoutError::Validation(errors) => {
                tracing::debug!("Validation error: {:?}", errors);
                (
                    "VALIDATION_ERROR",
                    "Request validation failed".to_string(),
                    Some(serde_json::to_value(&errors).unwrap_or(serde_json::json!({}))),
                )
            }
            CheckoutError::InvalidInput(msg) => {
                tracing::debug!("Invalid input: {}", msg);
                ("INVALID_INPUT", msg, None)
            }
            CheckoutError::OrderNotFound(id) => {
                tracing::debug!(%id, "Order not found");
                ("NOT_FOUND", format!("Order with id {} not found", id), None)
            }
            CheckoutError::InvalidTransition(msg) => {
                tracing::warn!("Rejected status change: {}", msg);
                ("INVALID_TRANSITION", msg, None)
            }
            CheckoutError::Timeout | CheckoutError::RetriesExhausted { .. } => {
                tracing::warn!("Checkout gave up after transient failures");
                (
                    "TRY_AGAIN",
                    "The store is busy, please try again".to_string(),
                    None,
                )
            }
            CheckoutError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                ("DATABASE_ERROR", "A database error occurred".to_string(), None)
            }
            CheckoutError::CommitOutcomeUnknown(e) => {
                tracing::error!("Commit outcome unknown: {:?}", e);
                (
                    "COMMIT_OUTCOME_UNKNOWN",
                    "The request may have been applied; check the order before retrying".to_string(),
                    None,
                )
            }
            CheckoutError::Invariant(msg) => {
                tracing::error!("Invariant violation: {}", msg);
                ("INTERNAL_ERROR", "An internal server error occurred".to_string(), None)
            }
            CheckoutError::CouponConfig(e) => {
                tracing::error!("Coupon misconfiguration: {}", e);
                ("INTERNAL_ERROR", "An internal server error occurred".to_string(), None)
            }
        };

        let body = ErrorResponse {
            error_code: error_code.to_string(),
            message,
            details,
            timestamp,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            CheckoutError::rejected(RejectionReason::LimitReached).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CheckoutError::InvalidInput("bad".to_string()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            CheckoutError::RetriesExhausted { attempts: 4 }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            CheckoutError::Invariant("drift".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(CheckoutError::Timeout.is_transient());
        assert!(CheckoutError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!CheckoutError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!CheckoutError::rejected(RejectionReason::InsufficientStock).is_transient());
    }

    #[test]
    fn test_commit_outcome_unknown_is_never_retried() {
        let err = CheckoutError::CommitOutcomeUnknown(sqlx::Error::PoolTimedOut);
        assert!(!err.is_transient());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(!CheckoutError::CommitOutcomeUnknown(sqlx::Error::Io(io)).is_transient());
    }

    #[test]
    fn test_counter_mismatch_is_invariant() {
        let err: CheckoutError = CouponError::CounterMismatch {
            coupon_id: 1,
            stored: 3,
            live: 2,
        }
        .into();
        assert!(matches!(err, CheckoutError::Invariant(_)));
    }

    #[test]
    fn test_negative_stock_is_invariant() {
        let err: CheckoutError = StockError::NegativeAvailable {
            product_id: 9,
            variant_id: None,
            available: -1,
        }
        .into();
        assert!(matches!(err, CheckoutError::Invariant(_)));
    }

    #[test]
    fn test_order_errors_map_to_http_variants() {
        let id = Uuid::new_v4();
        let err: CheckoutError = OrderError::NotFound(id).into();
        assert!(matches!(err, CheckoutError::OrderNotFound(found) if found == id));
    }
}
