// Tagged view of a coupon record.
//
// The persisted coupon is one flexible row with many optional columns. Rule
// evaluation works on this representation instead, so every discount kind and
// targeting mode is an explicit variant.

use chrono::{Duration, NaiveDate, NaiveTime};
use std::collections::HashSet;
use thiserror::Error;

use crate::coupons::models::{
    ApplyTo, Coupon, CouponStatus, CustomerRestriction, DeliveryRestriction, DiscountType,
};
use crate::validation::parse_time_window;

/// A coupon record that cannot be turned into an evaluable rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponConfigError {
    #[error("coupon {coupon_id}: percent discount {value} exceeds 100")]
    PercentOutOfRange { coupon_id: i64, value: i64 },

    #[error("coupon {coupon_id}: negative amount in {field}")]
    NegativeAmount { coupon_id: i64, field: &'static str },

    #[error("coupon {coupon_id}: usage_per_customer must be at least 1")]
    InvalidPerCustomerLimit { coupon_id: i64 },
}

/// Discount kind with the parameters that only make sense for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discount {
    Fixed { amount: i64 },
    Percent { percent: i64, cap: Option<i64> },
    FreeShip,
}

/// Which lines a coupon targets, before exclusions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Categories(HashSet<i64>),
    Products(HashSet<i64>),
}

impl Scope {
    pub fn includes(&self, product_id: i64, category_id: i64) -> bool {
        match self {
            Scope::All => true,
            Scope::Categories(ids) => ids.contains(&category_id),
            Scope::Products(ids) => ids.contains(&product_id),
        }
    }
}

/// Daily time-of-day window
///
/// Only same-day windows exist. A configured window whose end is not after its
/// start (including anything that would wrap past midnight) or that does not
/// parse is kept as `Misconfigured` and never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyWindow {
    Always,
    Between { start: NaiveTime, end: NaiveTime },
    Misconfigured,
}

impl DailyWindow {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return DailyWindow::Always;
        };

        match parse_time_window(raw) {
            Some((start, end)) if start < end => DailyWindow::Between { start, end },
            _ => DailyWindow::Misconfigured,
        }
    }

    /// Inclusive at minute granularity: `start <= t < end + 1 minute`
    pub fn contains(&self, t: NaiveTime) -> bool {
        match self {
            DailyWindow::Always => true,
            DailyWindow::Between { start, end } => {
                let (end_exclusive, wrapped) = end.overflowing_add_signed(Duration::minutes(1));
                t >= *start && (wrapped != 0 || t < end_exclusive)
            }
            DailyWindow::Misconfigured => false,
        }
    }
}

/// Evaluable coupon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponRule {
    pub coupon_id: i64,
    pub active: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub window: DailyWindow,
    pub delivery: DeliveryRestriction,
    pub customer: CustomerRestriction,
    pub allowed_emails: HashSet<String>,
    pub scope: Scope,
    pub excluded_products: HashSet<i64>,
    pub exclude_sale_items: bool,
    pub min_order_amount: i64,
    pub discount: Discount,
}

impl TryFrom<&Coupon> for CouponRule {
    type Error = CouponConfigError;

    fn try_from(coupon: &Coupon) -> Result<Self, Self::Error> {
        let negative = |field| CouponConfigError::NegativeAmount {
            coupon_id: coupon.id,
            field,
        };

        if coupon.discount_value < 0 {
            return Err(negative("discount_value"));
        }
        if coupon.min_order_amount < 0 {
            return Err(negative("min_order_amount"));
        }
        if coupon.usage_per_customer < 1 {
            return Err(CouponConfigError::InvalidPerCustomerLimit { coupon_id: coupon.id });
        }

        let discount = match coupon.discount_type {
            DiscountType::Fixed => Discount::Fixed {
                amount: coupon.discount_value,
            },
            DiscountType::Percent => {
                if coupon.discount_value > 100 {
                    return Err(CouponConfigError::PercentOutOfRange {
                        coupon_id: coupon.id,
                        value: coupon.discount_value,
                    });
                }
                if coupon.max_discount.is_some_and(|cap| cap < 0) {
                    return Err(negative("max_discount"));
                }
                Discount::Percent {
                    percent: coupon.discount_value,
                    cap: coupon.max_discount,
                }
            }
            DiscountType::FreeShip => Discount::FreeShip,
        };

        let scope = match coupon.apply_to {
            ApplyTo::All => Scope::All,
            ApplyTo::Category => Scope::Categories(coupon.category_ids.iter().copied().collect()),
            ApplyTo::Product => Scope::Products(coupon.product_ids.iter().copied().collect()),
        };

        let window = DailyWindow::parse(coupon.time_restriction.as_deref());
        if window == DailyWindow::Misconfigured {
            tracing::warn!(
                coupon_id = coupon.id,
                time_restriction = ?coupon.time_restriction,
                "Coupon has an unsupported daily window; it will never match"
            );
        }

        Ok(CouponRule {
            coupon_id: coupon.id,
            active: coupon.status == CouponStatus::Active,
            start_date: coupon.start_date,
            end_date: coupon.end_date,
            window,
            delivery: coupon.delivery_method,
            customer: coupon.customer_restriction,
            allowed_emails: coupon
                .allowed_customer_emails
                .iter()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            scope,
            excluded_products: coupon.exclude_product_ids.iter().copied().collect(),
            exclude_sale_items: coupon.exclude_sale_items,
            min_order_amount: coupon.min_order_amount,
            discount,
        })
    }
}
