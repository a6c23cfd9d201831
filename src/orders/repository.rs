use sqlx::{Executor, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::orders::error::{OrderError, OrderResult};
use crate::orders::{NewOrder, NewOrderDetail, Order, OrderDetail, OrderStatus, Product};

const ORDER_COLUMNS: &str = r#"
    id, user_id, customer_name, customer_email, customer_phone, delivery_method,
    subtotal, discount_amount, shipping_fee, total, coupon_id, status, created_at, updated_at
"#;

const DETAIL_COLUMNS: &str = "id, order_id, product_id, variant_id, qty, price, amount";

/// Read-only access to the storefront catalog
pub struct ProductRepository;

impl ProductRepository {
    /// Find multiple products by IDs; missing ids are simply absent from the result
    pub async fn find_by_ids<'e, E>(executor: E, ids: &[i64]) -> OrderResult<Vec<Product>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price_buy, price_sale, sale_start, sale_end, category_id, status
            FROM products
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(executor)
        .await?;

        Ok(products)
    }
}

/// Repository for order operations
#[derive(Clone)]
pub struct OrdersRepository {
    pool: PgPool,
}

impl OrdersRepository {
    /// Create a new OrdersRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the order header and its lines inside the caller's transaction
    ///
    /// The id is chosen by the caller so stock movements written earlier in
    /// the same transaction can already reference it.
    pub async fn insert(
        conn: &mut PgConnection,
        order: &NewOrder,
        details: &[NewOrderDetail],
    ) -> OrderResult<(Order, Vec<OrderDetail>)> {
        let sql = format!(
            r#"
            INSERT INTO orders (
                id, user_id, customer_name, customer_email, customer_phone, delivery_method,
                subtotal, discount_amount, shipping_fee, total, coupon_id, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, Order>(&sql)
            .bind(order.id)
            .bind(order.user_id)
            .bind(&order.customer_name)
            .bind(order.customer_email.as_deref())
            .bind(order.customer_phone.as_deref())
            .bind(order.delivery_method)
            .bind(order.subtotal)
            .bind(order.discount_amount)
            .bind(order.shipping_fee)
            .bind(order.total)
            .bind(order.coupon_id)
            .bind(OrderStatus::Pending)
            .fetch_one(&mut *conn)
            .await?;

        let detail_sql = format!(
            r#"
            INSERT INTO order_details (order_id, product_id, variant_id, qty, price, amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {DETAIL_COLUMNS}
            "#
        );
        let mut rows = Vec::with_capacity(details.len());
        for detail in details {
            let row = sqlx::query_as::<_, OrderDetail>(&detail_sql)
                .bind(created.id)
                .bind(detail.product_id)
                .bind(detail.variant_id)
                .bind(detail.qty)
                .bind(detail.price)
                .bind(detail.amount)
                .fetch_one(&mut *conn)
                .await?;
            rows.push(row);
        }

        Ok((created, rows))
    }

    /// Lock an order row until the surrounding transaction ends
    pub async fn lock_by_id(conn: &mut PgConnection, order_id: Uuid) -> OrderResult<Order> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Order>(&sql)
            .bind(order_id)
            .fetch_optional(conn)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    /// Update order status
    pub async fn update_status(
        conn: &mut PgConnection,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> OrderResult<Order> {
        let sql = format!(
            r#"
            UPDATE orders
            SET status = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING {ORDER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(new_status)
            .bind(order_id)
            .fetch_optional(conn)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    /// Find an order by ID
    pub async fn find_by_id(&self, order_id: Uuid) -> OrderResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    /// Find all lines for a given order
    pub async fn details<'e, E>(executor: E, order_id: Uuid) -> OrderResult<Vec<OrderDetail>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {DETAIL_COLUMNS} FROM order_details WHERE order_id = $1 ORDER BY id");
        let details = sqlx::query_as::<_, OrderDetail>(&sql)
            .bind(order_id)
            .fetch_all(executor)
            .await?;

        Ok(details)
    }

    /// Count non-cancelled orders previously placed by a customer
    ///
    /// Matches on user id, email (case-insensitive) or phone, the same
    /// identity rules used for per-customer coupon limits.
    pub async fn count_for_customer<'e, E>(
        executor: E,
        user_id: Option<i64>,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> OrderResult<i64>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE status <> 'cancelled'
              AND (
                    (user_id IS NOT NULL AND user_id = $1)
                 OR (customer_email IS NOT NULL AND LOWER(customer_email) = LOWER($2))
                 OR (customer_phone IS NOT NULL AND customer_phone = $3)
              )
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(phone)
        .fetch_one(executor)
        .await?;

        Ok(count)
    }
}
