use chrono::NaiveDateTime;
use serde::Serialize;

use crate::coupons::models::{CustomerRestriction, DeliveryRestriction};
use crate::coupons::rule::{CouponRule, Discount};
use crate::orders::DeliveryMethod;
use crate::rejection::RejectionReason;

/// One cart line as seen by rule evaluation, priced in minor currency units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: i64,
    pub category_id: i64,
    pub qty: i32,
    pub unit_price: i64,
    pub is_on_sale: bool,
}

impl CartLine {
    pub fn amount(&self) -> i64 {
        i64::from(self.qty).saturating_mul(self.unit_price)
    }
}

/// Facts about the customer that coupon rules depend on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerContext {
    pub is_new_customer: bool,
    pub birthday_today: bool,
    pub email: Option<String>,
    pub user_id: Option<i64>,
    pub requested_delivery_method: DeliveryMethod,
}

/// Outcome of a successful evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CouponEvaluation {
    pub eligible_subtotal: i64,
    pub discount_amount: i64,
    pub free_ship: bool,
}

/// Decides whether a coupon applies to a cart and what it is worth
///
/// Evaluation is pure: the same rule, cart, customer and clock always give the
/// same answer, and nothing is read from or written to storage.
pub struct CouponRuleEvaluator;

impl CouponRuleEvaluator {
    /// Run every rule in order, stopping at the first failure
    ///
    /// # Arguments
    /// * `rule` - Tagged coupon rule
    /// * `cart` - Priced cart lines
    /// * `customer` - Customer facts
    /// * `now` - Store-local wall clock
    pub fn evaluate(
        rule: &CouponRule,
        cart: &[CartLine],
        customer: &CustomerContext,
        now: NaiveDateTime,
    ) -> Result<CouponEvaluation, RejectionReason> {
        if !rule.active {
            return Err(RejectionReason::Inactive);
        }

        let today = now.date();
        if today < rule.start_date || today > rule.end_date {
            return Err(RejectionReason::OutOfDateRange);
        }
        if !rule.window.contains(now.time()) {
            return Err(RejectionReason::OutOfTimeWindow);
        }

        if !Self::delivery_matches(rule.delivery, customer.requested_delivery_method) {
            return Err(RejectionReason::DeliveryMethodMismatch);
        }

        let customer_ok = match rule.customer {
            CustomerRestriction::All => true,
            CustomerRestriction::New => customer.is_new_customer,
            CustomerRestriction::Birthday => customer.birthday_today,
        };
        if !customer_ok {
            return Err(RejectionReason::CustomerRestrictionFailed);
        }

        if !rule.allowed_emails.is_empty() {
            let email = customer.email.as_deref().map(|e| e.trim().to_lowercase());
            match email {
                Some(email) if rule.allowed_emails.contains(&email) => {}
                _ => return Err(RejectionReason::EmailNotAllowed),
            }
        }

        let eligible: Vec<&CartLine> = Self::eligible_lines(rule, cart).collect();
        if eligible.is_empty() {
            return Err(RejectionReason::NoEligibleItems);
        }
        let eligible_subtotal = Self::sum(eligible.iter().copied());

        let cart_subtotal = Self::sum(cart.iter());
        if cart_subtotal < rule.min_order_amount {
            return Err(RejectionReason::BelowMinOrder);
        }

        let (discount_amount, free_ship) = match rule.discount {
            Discount::Fixed { amount } => (amount.min(eligible_subtotal), false),
            Discount::Percent { percent, cap } => {
                let raw = Self::percent_of(eligible_subtotal, percent);
                (cap.map_or(raw, |cap| raw.min(cap)), false)
            }
            Discount::FreeShip => (0, true),
        };

        Ok(CouponEvaluation {
            eligible_subtotal,
            discount_amount,
            free_ship,
        })
    }

    /// Lines the discount is computed over, in cart order
    pub fn eligible_lines<'a>(
        rule: &'a CouponRule,
        cart: &'a [CartLine],
    ) -> impl Iterator<Item = &'a CartLine> + 'a {
        cart.iter().filter(move |line| {
            rule.scope.includes(line.product_id, line.category_id)
                && !rule.excluded_products.contains(&line.product_id)
                && !(rule.exclude_sale_items && line.is_on_sale)
        })
    }

    fn delivery_matches(restriction: DeliveryRestriction, requested: DeliveryMethod) -> bool {
        match restriction {
            DeliveryRestriction::All => true,
            DeliveryRestriction::Pickup => requested == DeliveryMethod::Pickup,
            DeliveryRestriction::Delivery => requested == DeliveryMethod::Delivery,
        }
    }

    fn sum<'a>(lines: impl Iterator<Item = &'a CartLine>) -> i64 {
        lines.fold(0i64, |acc, line| acc.saturating_add(line.amount()))
    }

    // Floor division; percent is already bounded to 0..=100
    fn percent_of(amount: i64, percent: i64) -> i64 {
        let value = i128::from(amount) * i128::from(percent) / 100;
        i64::try_from(value).unwrap_or(i64::MAX)
    }
}
