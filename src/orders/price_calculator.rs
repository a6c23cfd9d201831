/// Service for calculating order amounts in minor currency units
pub struct PriceCalculator;

impl PriceCalculator {
    /// Calculate the amount for an order line
    ///
    /// # Arguments
    /// * `qty` - Number of items ordered
    /// * `price` - Unit price snapshot at time of order
    pub fn line_amount(qty: i32, price: i64) -> i64 {
        i64::from(qty).saturating_mul(price)
    }

    /// Calculate the subtotal for an order (sum of all line amounts)
    pub fn subtotal(amounts: &[i64]) -> i64 {
        amounts.iter().fold(0i64, |acc, a| acc.saturating_add(*a))
    }

    /// Calculate the order total
    ///
    /// `total = subtotal - discount + shipping_fee`, with the discount never
    /// taking the goods below zero.
    pub fn order_total(subtotal: i64, discount: i64, shipping_fee: i64) -> i64 {
        let discount = discount.clamp(0, subtotal.max(0));
        subtotal - discount + shipping_fee.max(0)
    }
}
