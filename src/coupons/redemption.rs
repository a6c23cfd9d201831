// Redemption Guard
//
// Enforces global and per-customer coupon usage limits. All checks run while
// the coupon row is locked inside the caller's transaction; inserting the usage
// row is the reservation, so there is no gap between "check" and "take".

use sqlx::PgConnection;
use uuid::Uuid;

use crate::coupons::error::{CouponError, CouponResult};
use crate::coupons::models::{Coupon, CouponUsage, CustomerIdentity};
use crate::coupons::repository::CouponRepository;
use crate::rejection::RejectionReason;

const USAGE_COLUMNS: &str = r#"
    id, coupon_id, order_id, user_id, email, phone, order_amount,
    discount_amount, status, voided_at, created_at
"#;

/// Result of a reservation attempt
#[derive(Debug, Clone)]
pub enum RedemptionOutcome {
    /// Limits allow one more usage; carries the coupon as read under the lock
    Granted(Coupon),
    Rejected(RejectionReason),
}

/// Usage limit enforcement backed by the `coupon_usages` history
pub struct RedemptionGuard;

impl RedemptionGuard {
    /// Lock the coupon and check both usage limits against live counts
    ///
    /// Must run inside the checkout transaction. On `Granted` the caller is
    /// expected to call [`RedemptionGuard::record_usage`] before committing.
    pub async fn try_reserve(
        conn: &mut PgConnection,
        coupon_id: i64,
        identity: &CustomerIdentity,
    ) -> CouponResult<RedemptionOutcome> {
        let coupon = CouponRepository::lock_by_id(&mut *conn, coupon_id)
            .await?
            .ok_or(CouponError::Missing(coupon_id))?;

        let live = Self::live_count(&mut *conn, coupon_id).await?;
        Self::verify_counter(&coupon, live)?;

        if coupon.total_usage_limit > 0 && live >= i64::from(coupon.total_usage_limit) {
            tracing::debug!(coupon_id, live, limit = coupon.total_usage_limit, "Coupon limit reached");
            return Ok(RedemptionOutcome::Rejected(RejectionReason::LimitReached));
        }

        let per_customer = Self::customer_count(&mut *conn, coupon_id, identity).await?;
        if per_customer >= i64::from(coupon.usage_per_customer) {
            tracing::debug!(
                coupon_id,
                per_customer,
                limit = coupon.usage_per_customer,
                "Per-customer coupon limit reached"
            );
            return Ok(RedemptionOutcome::Rejected(RejectionReason::PerCustomerLimitReached));
        }

        Ok(RedemptionOutcome::Granted(coupon))
    }

    /// Insert the usage row and re-derive the coupon's counter
    ///
    /// `order_id` stays NULL until the order row exists; see [`RedemptionGuard::attach_order`].
    pub async fn record_usage(
        conn: &mut PgConnection,
        coupon_id: i64,
        identity: &CustomerIdentity,
        order_amount: i64,
        discount_amount: i64,
    ) -> CouponResult<CouponUsage> {
        let sql = format!(
            r#"
            INSERT INTO coupon_usages (coupon_id, user_id, email, phone, order_amount, discount_amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USAGE_COLUMNS}
            "#
        );
        let usage = sqlx::query_as::<_, CouponUsage>(&sql)
            .bind(coupon_id)
            .bind(identity.user_id)
            .bind(identity.normalized_email())
            .bind(identity.phone.as_deref())
            .bind(order_amount)
            .bind(discount_amount)
            .fetch_one(&mut *conn)
            .await?;

        Self::refresh_counter(&mut *conn, coupon_id).await?;

        Ok(usage)
    }

    /// Link a usage row to the order written later in the same transaction
    pub async fn attach_order(conn: &mut PgConnection, usage_id: i64, order_id: Uuid) -> CouponResult<()> {
        sqlx::query("UPDATE coupon_usages SET order_id = $1 WHERE id = $2 AND order_id IS NULL")
            .bind(order_id)
            .bind(usage_id)
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Void the active usages of a cancelled order, freeing their slots
    ///
    /// Rows are kept with status `void`; the coupon counter is re-derived.
    pub async fn void_for_order(conn: &mut PgConnection, order_id: Uuid) -> CouponResult<Vec<CouponUsage>> {
        let coupon_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT coupon_id FROM coupon_usages WHERE order_id = $1 AND status = 'active' ORDER BY coupon_id",
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut voided = Vec::new();
        for coupon_id in coupon_ids {
            CouponRepository::lock_by_id(&mut *conn, coupon_id)
                .await?
                .ok_or(CouponError::Missing(coupon_id))?;

            let sql = format!(
                r#"
                UPDATE coupon_usages
                SET status = 'void', voided_at = NOW()
                WHERE order_id = $1 AND coupon_id = $2 AND status = 'active'
                RETURNING {USAGE_COLUMNS}
                "#
            );
            let rows = sqlx::query_as::<_, CouponUsage>(&sql)
                .bind(order_id)
                .bind(coupon_id)
                .fetch_all(&mut *conn)
                .await?;

            Self::refresh_counter(&mut *conn, coupon_id).await?;
            voided.extend(rows);
        }

        Ok(voided)
    }

    /// Usages recorded for an order, void ones included
    pub async fn usages_for_order(conn: &mut PgConnection, order_id: Uuid) -> CouponResult<Vec<CouponUsage>> {
        let sql = format!("SELECT {USAGE_COLUMNS} FROM coupon_usages WHERE order_id = $1 ORDER BY id");
        let usages = sqlx::query_as::<_, CouponUsage>(&sql)
            .bind(order_id)
            .fetch_all(conn)
            .await?;

        Ok(usages)
    }

    async fn live_count(conn: &mut PgConnection, coupon_id: i64) -> CouponResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND status = 'active'",
        )
        .bind(coupon_id)
        .fetch_one(conn)
        .await?;

        Ok(count)
    }

    async fn customer_count(
        conn: &mut PgConnection,
        coupon_id: i64,
        identity: &CustomerIdentity,
    ) -> CouponResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM coupon_usages
            WHERE coupon_id = $1
              AND status = 'active'
              AND (
                    (user_id IS NOT NULL AND user_id = $2)
                 OR (email IS NOT NULL AND LOWER(email) = $3)
                 OR (phone IS NOT NULL AND phone = $4)
              )
            "#,
        )
        .bind(coupon_id)
        .bind(identity.user_id)
        .bind(identity.normalized_email())
        .bind(identity.phone.as_deref())
        .fetch_one(conn)
        .await?;

        Ok(count)
    }

    // Only ever called with the coupon row locked by this transaction
    async fn refresh_counter(conn: &mut PgConnection, coupon_id: i64) -> CouponResult<()> {
        sqlx::query(
            r#"
            UPDATE coupons
            SET current_usage_count = (
                SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND status = 'active'
            )
            WHERE id = $1
            "#,
        )
        .bind(coupon_id)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// A drifted counter means the history was tampered with; refuse and escalate
    fn verify_counter(coupon: &Coupon, live: i64) -> CouponResult<()> {
        let stored = i64::from(coupon.current_usage_count);
        if stored != live {
            tracing::error!(
                coupon_id = coupon.id,
                stored,
                live,
                "Coupon usage counter does not match usage history; refusing redemption"
            );
            return Err(CouponError::CounterMismatch {
                coupon_id: coupon.id,
                stored,
                live,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupons::rule::test_support::coupon;

    #[test]
    fn test_verify_counter_accepts_matching_count() {
        let mut c = coupon();
        c.current_usage_count = 4;
        assert!(RedemptionGuard::verify_counter(&c, 4).is_ok());
    }

    #[test]
    fn test_verify_counter_refuses_drift() {
        let mut c = coupon();
        c.current_usage_count = 2;
        let err = RedemptionGuard::verify_counter(&c, 3).unwrap_err();
        assert!(matches!(
            err,
            CouponError::CounterMismatch { coupon_id: 1, stored: 2, live: 3 }
        ));
    }
}
