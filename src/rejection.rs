// Machine-readable reasons a checkout or coupon check is refused.
// These are user-facing outcomes, returned as values rather than raised as errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Why a coupon or a checkout was rejected
///
/// Every coupon rule and every consistency guard yields its own variant so
/// callers (and tests) can tell exactly which check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// Coupon status is not active
    Inactive,
    /// Evaluation date is outside `[start_date, end_date]`
    OutOfDateRange,
    /// Time of day is outside the coupon's daily window (or the window is misconfigured)
    OutOfTimeWindow,
    /// Requested delivery method is not allowed by the coupon
    DeliveryMethodMismatch,
    /// Customer is not new / not celebrating a birthday as required
    CustomerRestrictionFailed,
    /// Customer email is not on the coupon's allow-list
    EmailNotAllowed,
    /// No cart line qualifies for the discount
    NoEligibleItems,
    /// Cart subtotal is below the coupon's minimum order amount
    BelowMinOrder,
    /// Coupon code does not exist
    CouponNotFound,
    /// Global usage limit is exhausted
    LimitReached,
    /// This customer already used the coupon the allowed number of times
    PerCustomerLimitReached,
    /// At least one line cannot be served from available stock
    InsufficientStock,
}

impl RejectionReason {
    /// Wire code, identical to the serialized form
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::Inactive => "INACTIVE",
            RejectionReason::OutOfDateRange => "OUT_OF_DATE_RANGE",
            RejectionReason::OutOfTimeWindow => "OUT_OF_TIME_WINDOW",
            RejectionReason::DeliveryMethodMismatch => "DELIVERY_METHOD_MISMATCH",
            RejectionReason::CustomerRestrictionFailed => "CUSTOMER_RESTRICTION_FAILED",
            RejectionReason::EmailNotAllowed => "EMAIL_NOT_ALLOWED",
            RejectionReason::NoEligibleItems => "NO_ELIGIBLE_ITEMS",
            RejectionReason::BelowMinOrder => "BELOW_MIN_ORDER",
            RejectionReason::CouponNotFound => "COUPON_NOT_FOUND",
            RejectionReason::LimitReached => "LIMIT_REACHED",
            RejectionReason::PerCustomerLimitReached => "PER_CUSTOMER_LIMIT_REACHED",
            RejectionReason::InsufficientStock => "INSUFFICIENT_STOCK",
        }
    }

    /// Human-readable message shown to the customer
    pub fn message(&self) -> &'static str {
        match self {
            RejectionReason::Inactive => "This coupon is no longer active",
            RejectionReason::OutOfDateRange => "This coupon is not valid today",
            RejectionReason::OutOfTimeWindow => "This coupon is not valid at this time of day",
            RejectionReason::DeliveryMethodMismatch => {
                "This coupon is not valid for the selected delivery method"
            }
            RejectionReason::CustomerRestrictionFailed => {
                "This coupon is reserved for other customers"
            }
            RejectionReason::EmailNotAllowed => "This coupon is not available for your account",
            RejectionReason::NoEligibleItems => "No item in your cart qualifies for this coupon",
            RejectionReason::BelowMinOrder => "Your order does not reach the coupon's minimum amount",
            RejectionReason::CouponNotFound => "Coupon code not found",
            RejectionReason::LimitReached => "This coupon has been fully redeemed",
            RejectionReason::PerCustomerLimitReached => "You have already used this coupon",
            RejectionReason::InsufficientStock => "Some items are out of stock",
        }
    }

    /// Whether the reason comes from coupon rules or limits (as opposed to stock)
    pub fn is_coupon_reason(&self) -> bool {
        !matches!(self, RejectionReason::InsufficientStock)
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
