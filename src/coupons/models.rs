use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::validation::validate_customer_identity;

/// Coupon lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CouponStatus {
    Active,
    Inactive,
}

/// How the coupon's discount value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Flat amount off, in minor currency units
    Fixed,
    /// Percentage of the eligible subtotal
    Percent,
    /// Shipping fee waived
    FreeShip,
}

/// Which cart lines the coupon targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApplyTo {
    All,
    Category,
    Product,
}

/// Delivery methods a coupon accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryRestriction {
    All,
    Pickup,
    Delivery,
}

/// Customers a coupon is reserved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CustomerRestriction {
    All,
    New,
    Birthday,
}

/// Persisted coupon record
///
/// Flat, as edited in the back office. Rule evaluation works on the tagged [`CouponRule`](crate::coupons::CouponRule)
/// built from it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub max_discount: Option<i64>,
    pub min_order_amount: i64,
    pub apply_to: ApplyTo,
    pub category_ids: Vec<i64>,
    pub product_ids: Vec<i64>,
    pub exclude_product_ids: Vec<i64>,
    pub delivery_method: DeliveryRestriction,
    pub advance_hours: i32,
    pub customer_restriction: CustomerRestriction,
    pub exclude_sale_items: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub time_restriction: Option<String>,
    pub total_usage_limit: i32,
    pub current_usage_count: i32,
    pub usage_per_customer: i32,
    pub allowed_customer_emails: Vec<String>,
    pub can_stack_with_ship: bool,
    pub status: CouponStatus,
}

/// Usage row status; void rows stay in the table for audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Active,
    Void,
}

/// One redemption of a coupon
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CouponUsage {
    pub id: i64,
    pub coupon_id: i64,
    pub order_id: Option<uuid::Uuid>,
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub order_amount: i64,
    pub discount_amount: i64,
    pub status: UsageStatus,
    pub voided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Who is redeeming; at least one field must be present
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_customer_identity"))]
pub struct CustomerIdentity {
    #[schema(example = 42)]
    pub user_id: Option<i64>,
    #[validate(email(message = "Email must be a valid address"))]
    #[schema(example = "jane@example.com")]
    pub email: Option<String>,
    #[validate(length(min = 6, max = 20, message = "Phone must be 6 to 20 characters"))]
    #[schema(example = "0901234567")]
    pub phone: Option<String>,
}

impl CustomerIdentity {
    /// Email lowercased for case-insensitive matching
    pub fn normalized_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase)
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none() && self.normalized_email().is_none() && self.phone.is_none()
    }
}
