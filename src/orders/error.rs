use uuid::Uuid;

/// Error types for order operations
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Order {0} not found")]
    NotFound(Uuid),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),
}

pub type OrderResult<T> = Result<T, OrderError>;
