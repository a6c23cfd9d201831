use thiserror::Error;

use crate::coupons::rule::CouponConfigError;

/// Failures of the coupon store that are not customer-facing rejections
#[derive(Debug, Error)]
pub enum CouponError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Coupon {0} disappeared while locked")]
    Missing(i64),

    /// Stored counter no longer matches the usage history
    #[error("Coupon {coupon_id} usage counter is {stored} but history holds {live} counted usages")]
    CounterMismatch {
        coupon_id: i64,
        stored: i64,
        live: i64,
    },

    #[error(transparent)]
    Config(#[from] CouponConfigError),
}

pub type CouponResult<T> = Result<T, CouponError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CouponError::CounterMismatch {
            coupon_id: 3,
            stored: 5,
            live: 4,
        };
        assert_eq!(
            error.to_string(),
            "Coupon 3 usage counter is 5 but history holds 4 counted usages"
        );
    }

    #[test]
    fn test_error_from_sqlx() {
        let error: CouponError = sqlx::Error::RowNotFound.into();
        assert!(matches!(error, CouponError::Database(_)));
    }
}
