//! Stock ledger.
//!
//! Stock is never stored as a mutable counter. The available quantity of a
//! product/variant pool is the sum of its active movements, and every change
//! is a new row:
//!
//! ```text
//!   IN          +10   stock_in   (back office)
//!   OUT          -2   order      #a1b2…
//!   ROLLBACK_IN  +2   order      #a1b2…   (cancellation)
//!   ─────────────────
//!   available    10
//! ```
//!
//! Reservations lock the product rows (ascending id, so concurrent checkouts
//! always acquire locks in the same order) before summing, which makes the
//! check and the OUT insert atomic with respect to other checkouts.

use std::collections::BTreeMap;

use sqlx::{Executor, PgConnection, PgPool, Postgres};
use thiserror::Error;
use uuid::Uuid;

use crate::stock::models::{
    MovementType, Shortfall, StockDemand, StockLevel, StockMovement, StockOutcome, REF_ORDER,
};

const MOVEMENT_COLUMNS: &str =
    "id, product_id, variant_id, qty, movement_type, ref_type, ref_id, note, status, created_at";

#[derive(Debug, Error)]
pub enum StockError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The ledger sums to a negative quantity; never corrected automatically
    #[error("Stock ledger for product {product_id} (variant {variant_id:?}) sums to {available}")]
    NegativeAvailable {
        product_id: i64,
        variant_id: Option<i64>,
        available: i64,
    },

    #[error("Quantity {qty} for product {product_id} does not fit a movement row")]
    QuantityOverflow { product_id: i64, qty: i64 },
}

pub type StockResult<T> = Result<T, StockError>;

/// Append-only stock journal
#[derive(Clone)]
pub struct StockLedger {
    pool: PgPool,
}

impl StockLedger {
    /// Create a new StockLedger
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current level and full history of one pool, read outside any checkout
    pub async fn level(&self, product_id: i64, variant_id: Option<i64>) -> StockResult<StockLevel> {
        let available_qty = Self::available_qty(&self.pool, product_id, variant_id).await?;
        let movements = Self::history(&self.pool, product_id, variant_id).await?;

        Ok(StockLevel {
            product_id,
            variant_id,
            available_qty,
            movements,
        })
    }

    /// Sum of active movements for a pool
    ///
    /// A negative sum is reported as [`StockError::NegativeAvailable`].
    pub async fn available_qty<'e, E>(
        executor: E,
        product_id: i64,
        variant_id: Option<i64>,
    ) -> StockResult<i64>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let available: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(qty), 0)::BIGINT
            FROM stock_movements
            WHERE product_id = $1
              AND variant_id IS NOT DISTINCT FROM $2
              AND status = 'active'
            "#,
        )
        .bind(product_id)
        .bind(variant_id)
        .fetch_one(executor)
        .await?;

        if available < 0 {
            tracing::error!(
                product_id,
                ?variant_id,
                available,
                "Stock ledger sums to a negative quantity; manual correction required"
            );
            return Err(StockError::NegativeAvailable {
                product_id,
                variant_id,
                available,
            });
        }

        Ok(available)
    }

    /// All movements of a pool, oldest first
    pub async fn history<'e, E>(
        executor: E,
        product_id: i64,
        variant_id: Option<i64>,
    ) -> StockResult<Vec<StockMovement>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements
            WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2
            ORDER BY id
            "#
        );
        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(product_id)
            .bind(variant_id)
            .fetch_all(executor)
            .await?;

        Ok(movements)
    }

    /// Merge lines for the same pool and order them by lock order
    pub fn merge_demands<I>(lines: I) -> Vec<StockDemand>
    where
        I: IntoIterator<Item = (i64, Option<i64>, i64)>,
    {
        let mut merged: BTreeMap<(i64, Option<i64>), i64> = BTreeMap::new();
        for (product_id, variant_id, qty) in lines {
            *merged.entry((product_id, variant_id)).or_default() += qty;
        }

        merged
            .into_iter()
            .map(|((product_id, variant_id), qty)| StockDemand {
                product_id,
                variant_id,
                qty,
            })
            .collect()
    }

    /// Lock the product rows behind a set of demands
    ///
    /// Locks are taken in ascending product id in a single statement.
    pub async fn lock_products(conn: &mut PgConnection, product_ids: &[i64]) -> StockResult<Vec<i64>> {
        let mut ids = product_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let locked: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE")
                .bind(&ids)
                .fetch_all(conn)
                .await?;

        Ok(locked)
    }

    /// Reserve every demand for an order, reporting all shortfalls
    ///
    /// Demands must come from [`StockLedger::merge_demands`]. Reservation keeps
    /// going after a shortfall so the caller learns every offending line; the
    /// caller is expected to roll the transaction back in that case.
    pub async fn reserve_all(
        conn: &mut PgConnection,
        demands: &[StockDemand],
        order_id: Uuid,
    ) -> StockResult<Vec<StockOutcome>> {
        let product_ids: Vec<i64> = demands.iter().map(|d| d.product_id).collect();
        Self::lock_products(&mut *conn, &product_ids).await?;

        let mut outcomes = Vec::with_capacity(demands.len());
        for demand in demands {
            outcomes.push(Self::reserve_locked(&mut *conn, demand, order_id).await?);
        }

        Ok(outcomes)
    }

    /// Reserve a single demand, taking its product lock first
    pub async fn reserve(
        conn: &mut PgConnection,
        demand: &StockDemand,
        order_id: Uuid,
    ) -> StockResult<StockOutcome> {
        Self::lock_products(&mut *conn, &[demand.product_id]).await?;
        Self::reserve_locked(conn, demand, order_id).await
    }

    async fn reserve_locked(
        conn: &mut PgConnection,
        demand: &StockDemand,
        order_id: Uuid,
    ) -> StockResult<StockOutcome> {
        let available = Self::available_qty(&mut *conn, demand.product_id, demand.variant_id).await?;

        if let Some(shortfall) = Self::shortfall(demand, available) {
            tracing::debug!(
                product_id = demand.product_id,
                variant_id = ?demand.variant_id,
                requested = demand.qty,
                available,
                "Insufficient stock"
            );
            return Ok(StockOutcome::Insufficient(shortfall));
        }

        let qty = i32::try_from(demand.qty).map_err(|_| StockError::QuantityOverflow {
            product_id: demand.product_id,
            qty: demand.qty,
        })?;

        let movement = Self::append(
            &mut *conn,
            demand.product_id,
            demand.variant_id,
            -qty,
            MovementType::Out,
            order_id,
            None,
        )
        .await?;

        Ok(StockOutcome::Reserved(movement))
    }

    /// Compensate every OUT of an order with a ROLLBACK_IN of equal size
    ///
    /// Original rows are left untouched. An order that already carries
    /// ROLLBACK_IN rows is not compensated again.
    pub async fn rollback(conn: &mut PgConnection, order_id: Uuid) -> StockResult<Vec<StockMovement>> {
        let ref_id = order_id.to_string();

        let already: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM stock_movements
            WHERE ref_type = $1 AND ref_id = $2 AND movement_type = 'ROLLBACK_IN'
            "#,
        )
        .bind(REF_ORDER)
        .bind(&ref_id)
        .fetch_one(&mut *conn)
        .await?;

        if already > 0 {
            tracing::debug!(%order_id, "Stock already rolled back for order");
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements
            WHERE ref_type = $1 AND ref_id = $2 AND movement_type = 'OUT' AND status = 'active'
            ORDER BY id
            "#
        );
        let outs = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(REF_ORDER)
            .bind(&ref_id)
            .fetch_all(&mut *conn)
            .await?;

        let mut compensations = Vec::with_capacity(outs.len());
        for out in outs {
            let movement = Self::append(
                &mut *conn,
                out.product_id,
                out.variant_id,
                -out.qty,
                MovementType::RollbackIn,
                order_id,
                Some(format!("rollback of movement {}", out.id)),
            )
            .await?;
            compensations.push(movement);
        }

        tracing::info!(%order_id, movements = compensations.len(), "Stock rolled back for cancelled order");
        Ok(compensations)
    }

    /// Pure availability check
    pub fn shortfall(demand: &StockDemand, available: i64) -> Option<Shortfall> {
        if available >= demand.qty {
            return None;
        }
        Some(Shortfall {
            product_id: demand.product_id,
            variant_id: demand.variant_id,
            requested: demand.qty,
            available,
            missing: demand.qty - available,
        })
    }

    async fn append(
        conn: &mut PgConnection,
        product_id: i64,
        variant_id: Option<i64>,
        qty: i32,
        movement_type: MovementType,
        order_id: Uuid,
        note: Option<String>,
    ) -> StockResult<StockMovement> {
        let sql = format!(
            r#"
            INSERT INTO stock_movements (product_id, variant_id, qty, movement_type, ref_type, ref_id, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {MOVEMENT_COLUMNS}
            "#
        );
        let movement = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(product_id)
            .bind(variant_id)
            .bind(qty)
            .bind(movement_type)
            .bind(REF_ORDER)
            .bind(order_id.to_string())
            .bind(note)
            .fetch_one(conn)
            .await?;

        Ok(movement)
    }
}
