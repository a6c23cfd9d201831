use sqlx::{Executor, PgConnection, Postgres};

use crate::coupons::error::CouponResult;
use crate::coupons::models::Coupon;

pub(crate) const COUPON_COLUMNS: &str = r#"
    id, code, discount_type, discount_value, max_discount, min_order_amount,
    apply_to, category_ids, product_ids, exclude_product_ids, delivery_method,
    advance_hours, customer_restriction, exclude_sale_items, start_date, end_date,
    time_restriction, total_usage_limit, current_usage_count, usage_per_customer,
    allowed_customer_emails, can_stack_with_ship, status
"#;

/// Read access to coupon records
pub struct CouponRepository;

impl CouponRepository {
    /// Find a coupon by code, ignoring case and surrounding whitespace
    pub async fn find_by_code<'e, E>(executor: E, code: &str) -> CouponResult<Option<Coupon>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE LOWER(code) = LOWER($1)"
        );
        let coupon = sqlx::query_as::<_, Coupon>(&sql)
            .bind(code.trim())
            .fetch_optional(executor)
            .await?;

        Ok(coupon)
    }

    /// Lock the coupon row until the surrounding transaction ends
    pub async fn lock_by_id(conn: &mut PgConnection, coupon_id: i64) -> CouponResult<Option<Coupon>> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1 FOR UPDATE");
        let coupon = sqlx::query_as::<_, Coupon>(&sql)
            .bind(coupon_id)
            .fetch_optional(conn)
            .await?;

        Ok(coupon)
    }
}
