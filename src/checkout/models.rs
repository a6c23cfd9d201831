use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::coupons::CustomerIdentity;
use crate::orders::{DeliveryMethod, OrderStatus};
use crate::rejection::RejectionReason;
use crate::stock::Shortfall;
use crate::validation::validate_coupon_code;

/// One cart line as sent by the storefront
///
/// Only product, variant and quantity are trusted; prices are resolved from
/// the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartItemRequest {
    #[schema(example = 12)]
    pub product_id: i64,
    pub variant_id: Option<i64>,
    #[validate(range(min = 1, max = 1000, message = "Quantity must be between 1 and 1000"))]
    #[schema(example = 2)]
    pub qty: i32,
    /// Price shown to the customer; informational only
    pub price: Option<i64>,
}

/// Customer block of checkout requests
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CustomerRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1 to 200 characters"))]
    #[schema(example = "Jane Doe")]
    pub name: String,
    pub user_id: Option<i64>,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
    #[validate(length(min = 6, max = 20, message = "Phone must be 6 to 20 characters"))]
    pub phone: Option<String>,
    pub birthday: Option<NaiveDate>,
}

impl CustomerRequest {
    pub fn identity(&self) -> CustomerIdentity {
        CustomerIdentity {
            user_id: self.user_id,
            email: self.email.as_ref().map(|e| e.trim().to_string()),
            phone: self.phone.as_ref().map(|p| p.trim().to_string()),
        }
    }

    /// Month and day match the store-local date; Feb 29 birthdays count on Feb 28 in common years
    pub fn birthday_on(&self, today: NaiveDate) -> bool {
        let Some(birthday) = self.birthday else {
            return false;
        };
        if birthday.month() == today.month() && birthday.day() == today.day() {
            return true;
        }
        let leap_day = birthday.month() == 2 && birthday.day() == 29;
        leap_day && today.month() == 2 && today.day() == 28 && NaiveDate::from_ymd_opt(today.year(), 2, 29).is_none()
    }
}

/// Request DTO for the coupon preview
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ValidateCouponRequest {
    #[validate(custom = "validate_coupon_code")]
    #[schema(example = "SAVE10")]
    pub code: String,
    #[validate(length(min = 1, max = 100, message = "Cart must contain 1 to 100 items"))]
    #[validate]
    pub cart_items: Vec<CartItemRequest>,
    /// Subtotal shown to the customer; informational only
    pub subtotal: Option<i64>,
    /// Name is not needed for a preview, so the block is not validated here
    #[serde(default)]
    pub customer: CustomerRequest,
    #[serde(default)]
    pub delivery_method: DeliveryMethod,
}

/// Response DTO for the coupon preview
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidateCouponResponse {
    pub valid: bool,
    pub discount_amount: i64,
    pub free_ship: bool,
    pub eligible_subtotal: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
    pub message: String,
}

impl ValidateCouponResponse {
    pub fn rejected(reason: RejectionReason) -> Self {
        Self {
            valid: false,
            discount_amount: 0,
            free_ship: false,
            eligible_subtotal: 0,
            reason: Some(reason),
            message: reason.message().to_string(),
        }
    }
}

/// Request DTO for placing an order
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderRequest {
    #[validate(length(min = 1, max = 100, message = "Order must contain 1 to 100 items"))]
    #[validate]
    pub items: Vec<CartItemRequest>,
    #[validate(custom = "validate_coupon_code")]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub delivery_method: DeliveryMethod,
    #[validate]
    pub customer: CustomerRequest,
}

impl PlaceOrderRequest {
    /// Coupon code with blank input treated as absent
    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}

/// Response DTO for a committed order
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlaceOrderResponse {
    pub order_id: Uuid,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub shipping_fee: i64,
    pub total: i64,
    pub status: OrderStatus,
    pub coupon_applied: bool,
}

/// Details attached to a rejected checkout
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RejectionDetails {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub shortfalls: Vec<Shortfall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
}

/// Published after an order commits, for payment and notification listeners
#[derive(Debug, Clone, Serialize)]
pub struct OrderCommitted {
    pub order_id: Uuid,
    pub total: i64,
    pub coupon_id: Option<i64>,
    pub customer_email: Option<String>,
    pub committed_at: DateTime<Utc>,
}
