// Integration tests for the checkout core
// These run against a real Postgres database named by DATABASE_URL:
//   DATABASE_URL=postgres://... cargo test -- --ignored
// Every test seeds its own products and coupons, so tests do not interfere.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use checkout_core::checkout::{
    CartItemRequest, CheckoutError, CheckoutOrchestrator, CustomerRequest, PlaceOrderRequest,
};
use checkout_core::config::{CheckoutSettings, CouponExhaustedPolicy, CouponReleasePolicy};
use checkout_core::coupons::{RedemptionGuard, UsageStatus};
use checkout_core::orders::{DeliveryMethod, OrderStatus};
use checkout_core::rejection::RejectionReason;
use checkout_core::stock::{MovementType, StockDemand, StockLedger, StockOutcome};
use checkout_core::{create_router, AppState};

// ============================================================================
// Test Helpers
// ============================================================================

async fn create_test_pool() -> PgPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

async fn seed_product(pool: &PgPool, price: i64, stock: i32) -> i64 {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO products (name, price_buy, category_id) VALUES ('Test product', $1, 1) RETURNING id",
    )
    .bind(price)
    .fetch_one(pool)
    .await
    .expect("Failed to seed product");

    if stock > 0 {
        sqlx::query(
            "INSERT INTO stock_movements (product_id, qty, movement_type, ref_type) VALUES ($1, $2, 'IN', 'stock_in')",
        )
        .bind(id)
        .bind(stock)
        .execute(pool)
        .await
        .expect("Failed to seed stock");
    }

    id
}

struct CouponSeed {
    discount_type: &'static str,
    discount_value: i64,
    max_discount: Option<i64>,
    min_order_amount: i64,
    delivery_method: &'static str,
    total_usage_limit: i32,
    usage_per_customer: i32,
}

impl Default for CouponSeed {
    fn default() -> Self {
        Self {
            discount_type: "percent",
            discount_value: 10,
            max_discount: None,
            min_order_amount: 0,
            delivery_method: "all",
            total_usage_limit: 0,
            usage_per_customer: 1,
        }
    }
}

/// Insert a coupon valid for a year either side of today; returns (id, code)
async fn seed_coupon(pool: &PgPool, seed: CouponSeed) -> (i64, String) {
    let code = format!("T{}", &Uuid::new_v4().simple().to_string()[..12]).to_uppercase();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO coupons (
            code, discount_type, discount_value, max_discount, min_order_amount,
            delivery_method, start_date, end_date, total_usage_limit, usage_per_customer
        )
        VALUES ($1, $2, $3, $4, $5, $6, CURRENT_DATE - 365, CURRENT_DATE + 365, $7, $8)
        RETURNING id
        "#,
    )
    .bind(&code)
    .bind(seed.discount_type)
    .bind(seed.discount_value)
    .bind(seed.max_discount)
    .bind(seed.min_order_amount)
    .bind(seed.delivery_method)
    .bind(seed.total_usage_limit)
    .bind(seed.usage_per_customer)
    .fetch_one(pool)
    .await
    .expect("Failed to seed coupon");

    (id, code)
}

fn order_request(product_id: i64, qty: i32, coupon: Option<&str>, email: &str) -> PlaceOrderRequest {
    PlaceOrderRequest {
        items: vec![CartItemRequest {
            product_id,
            variant_id: None,
            qty,
            price: None,
        }],
        coupon_code: coupon.map(str::to_string),
        delivery_method: DeliveryMethod::Pickup,
        customer: CustomerRequest {
            name: "Test Customer".to_string(),
            email: Some(email.to_string()),
            ..Default::default()
        },
    }
}

fn unique_email() -> String {
    format!("{}@example.com", Uuid::new_v4().simple())
}

fn orchestrator(pool: &PgPool, settings: CheckoutSettings) -> Arc<CheckoutOrchestrator> {
    Arc::new(CheckoutOrchestrator::new(pool.clone(), settings))
}

async fn active_usages(pool: &PgPool, coupon_id: i64) -> (i64, i32) {
    let live: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND status = 'active'")
        .bind(coupon_id)
        .fetch_one(pool)
        .await
        .unwrap();
    let stored: i32 = sqlx::query_scalar("SELECT current_usage_count FROM coupons WHERE id = $1")
        .bind(coupon_id)
        .fetch_one(pool)
        .await
        .unwrap();
    (live, stored)
}

// ============================================================================
// HTTP Tests
// ============================================================================

/// 10% coupon capped at 50000 on a 600000 cart gives 50000 off
#[tokio::test]
#[ignore]
async fn test_place_order_applies_capped_percent_coupon() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 300000, 10).await;
    let (coupon_id, code) = seed_coupon(
        &pool,
        CouponSeed {
            max_discount: Some(50000),
            min_order_amount: 100000,
            ..Default::default()
        },
    )
    .await;
    let server = TestServer::new(create_router(AppState::new(pool.clone(), CheckoutSettings::default()))).unwrap();

    let response = server
        .post("/checkout/place-order")
        .json(&json!({
            "items": [{"product_id": product, "qty": 2}],
            "coupon_code": code.to_lowercase(),
            "delivery_method": "pickup",
            "customer": {"name": "Jane", "email": unique_email()}
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["subtotal"], 600000);
    assert_eq!(body["discount_amount"], 50000);
    assert_eq!(body["shipping_fee"], 0);
    assert_eq!(body["total"], 550000);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["coupon_applied"], true);

    assert_eq!(active_usages(&pool, coupon_id).await, (1, 1));

    let order_id = body["order_id"].as_str().unwrap();
    let order: Value = server.get(&format!("/orders/{order_id}")).await.json();
    assert_eq!(order["coupon_id"], coupon_id);
    assert_eq!(order["details"].as_array().unwrap().len(), 1);
    assert_eq!(order["details"][0]["price"], 300000);
}

/// Pickup-only coupon previewed for a delivery order
#[tokio::test]
#[ignore]
async fn test_validate_coupon_reports_delivery_mismatch_without_side_effects() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 100000, 5).await;
    let (coupon_id, code) = seed_coupon(
        &pool,
        CouponSeed {
            discount_type: "free_ship",
            discount_value: 0,
            delivery_method: "pickup",
            ..Default::default()
        },
    )
    .await;
    let server = TestServer::new(create_router(AppState::new(pool.clone(), CheckoutSettings::default()))).unwrap();

    let response = server
        .post("/checkout/validate-coupon")
        .json(&json!({
            "code": code,
            "cart_items": [{"product_id": product, "qty": 1}],
            "delivery_method": "delivery",
            "customer": {"name": "Jane", "email": unique_email()}
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["valid"], false);
    assert_eq!(body["reason"], "DELIVERY_METHOD_MISMATCH");
    assert_eq!(active_usages(&pool, coupon_id).await, (0, 0));
}

#[tokio::test]
#[ignore]
async fn test_place_order_unknown_coupon_is_conflict() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 100000, 5).await;
    let server = TestServer::new(create_router(AppState::new(pool.clone(), CheckoutSettings::default()))).unwrap();

    let response = server
        .post("/checkout/place-order")
        .json(&json!({
            "items": [{"product_id": product, "qty": 1}],
            "coupon_code": "NOSUCHCODE",
            "customer": {"name": "Jane", "email": unique_email()}
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["reason"], "COUPON_NOT_FOUND");

    let available = StockLedger::available_qty(&pool, product, None).await.unwrap();
    assert_eq!(available, 5);
}

#[tokio::test]
#[ignore]
async fn test_place_order_invalid_quantity_is_unprocessable() {
    let pool = create_test_pool().await;
    let server = TestServer::new(create_router(AppState::new(pool, CheckoutSettings::default()))).unwrap();

    let response = server
        .post("/checkout/place-order")
        .json(&json!({
            "items": [{"product_id": 1, "qty": 0}],
            "customer": {"name": "Jane", "email": "jane@example.com"}
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

#[tokio::test]
#[ignore]
async fn test_stock_endpoint_and_health() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 100000, 7).await;
    let server = TestServer::new(create_router(AppState::new(pool, CheckoutSettings::default()))).unwrap();

    let health = server.get("/health").await;
    assert_eq!(health.status_code(), StatusCode::OK);

    let body: Value = server.get(&format!("/stock/{product}")).await.json();
    assert_eq!(body["available_qty"], 7);
    assert_eq!(body["movements"][0]["movement_type"], "IN");
}

// ============================================================================
// Concurrency Tests
// ============================================================================

/// Stock 1, two simultaneous orders of 1: exactly one succeeds
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_concurrent_orders_never_oversell() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 100000, 1).await;
    let checkout = orchestrator(&pool, CheckoutSettings::default());

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let checkout = checkout.clone();
            tokio::spawn(async move { checkout.place_order(order_request(product, 1, None, &unique_email())).await })
        })
        .collect();

    let mut committed = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(CheckoutError::Rejected { reason, details }) => {
                assert_eq!(reason, RejectionReason::InsufficientStock);
                assert_eq!(details.shortfalls.len(), 1);
                assert_eq!(details.shortfalls[0].missing, 1);
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!((committed, rejected), (1, 1));
    assert_eq!(StockLedger::available_qty(&pool, product, None).await.unwrap(), 0);
}

/// Many buyers racing for a small pool never push it below zero
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn test_stock_stays_non_negative_under_load() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 1000, 5).await;
    let checkout = orchestrator(&pool, CheckoutSettings::default());

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let checkout = checkout.clone();
            tokio::spawn(async move { checkout.place_order(order_request(product, 1, None, &unique_email())).await })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            committed += 1;
        }
    }

    assert_eq!(committed, 5);
    assert_eq!(StockLedger::available_qty(&pool, product, None).await.unwrap(), 0);
}

/// Coupon limited to one use, two simultaneous checkouts: one usage row
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_concurrent_coupon_checkouts_respect_global_limit() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 200000, 10).await;
    let (coupon_id, code) = seed_coupon(
        &pool,
        CouponSeed {
            total_usage_limit: 1,
            ..Default::default()
        },
    )
    .await;
    let checkout = orchestrator(&pool, CheckoutSettings::default());

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let checkout = checkout.clone();
            let code = code.clone();
            tokio::spawn(async move {
                checkout
                    .place_order(order_request(product, 1, Some(&code), &unique_email()))
                    .await
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    let committed = outcomes.iter().filter(|o| o.is_ok()).count();
    let limited = outcomes
        .iter()
        .filter(|o| matches!(o, Err(CheckoutError::Rejected { reason: RejectionReason::LimitReached, .. })))
        .count();
    assert_eq!((committed, limited), (1, 1));
    assert_eq!(active_usages(&pool, coupon_id).await, (1, 1));

    // The losing checkout released its stock with the rollback
    assert_eq!(StockLedger::available_qty(&pool, product, None).await.unwrap(), 9);
}

#[tokio::test]
#[ignore]
async fn test_per_customer_limit_matches_email_case_insensitively() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 200000, 10).await;
    let (coupon_id, code) = seed_coupon(&pool, CouponSeed::default()).await;
    let checkout = orchestrator(&pool, CheckoutSettings::default());
    let email = unique_email();

    checkout
        .place_order(order_request(product, 1, Some(&code), &email))
        .await
        .unwrap();

    let err = checkout
        .place_order(order_request(product, 1, Some(&code), &email.to_uppercase()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Rejected { reason: RejectionReason::PerCustomerLimitReached, .. }
    ));
    assert_eq!(active_usages(&pool, coupon_id).await, (1, 1));
}

#[tokio::test]
#[ignore]
async fn test_drop_coupon_policy_places_order_at_full_price() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 200000, 10).await;
    let (coupon_id, code) = seed_coupon(
        &pool,
        CouponSeed {
            total_usage_limit: 1,
            ..Default::default()
        },
    )
    .await;
    let checkout = orchestrator(
        &pool,
        CheckoutSettings {
            exhausted_policy: CouponExhaustedPolicy::DropCoupon,
            ..Default::default()
        },
    );

    checkout
        .place_order(order_request(product, 1, Some(&code), &unique_email()))
        .await
        .unwrap();
    let second = checkout
        .place_order(order_request(product, 1, Some(&code), &unique_email()))
        .await
        .unwrap();

    assert!(!second.coupon_applied);
    assert_eq!(second.discount_amount, 0);
    assert_eq!(second.total, 200000);
    assert_eq!(active_usages(&pool, coupon_id).await, (1, 1));
}

// ============================================================================
// Cancellation Tests
// ============================================================================

/// Cancel after commit: OUT(-2) then ROLLBACK_IN(+2), stock restored, idempotent
#[tokio::test]
#[ignore]
async fn test_cancel_restores_stock_once() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 50000, 5).await;
    let checkout = orchestrator(&pool, CheckoutSettings::default());

    let placed = checkout
        .place_order(order_request(product, 2, None, &unique_email()))
        .await
        .unwrap();
    assert_eq!(StockLedger::available_qty(&pool, product, None).await.unwrap(), 3);

    let cancelled = checkout.cancel_order(placed.order_id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    checkout.cancel_order(placed.order_id).await.unwrap();

    let history = StockLedger::history(&pool, product, None).await.unwrap();
    let kinds: Vec<(MovementType, i32)> = history.iter().map(|m| (m.movement_type, m.qty)).collect();
    assert_eq!(
        kinds,
        vec![
            (MovementType::In, 5),
            (MovementType::Out, -2),
            (MovementType::RollbackIn, 2),
        ]
    );
    assert_eq!(StockLedger::available_qty(&pool, product, None).await.unwrap(), 5);
}

#[tokio::test]
#[ignore]
async fn test_cancel_with_void_policy_frees_coupon_slot() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 200000, 10).await;
    let (coupon_id, code) = seed_coupon(
        &pool,
        CouponSeed {
            total_usage_limit: 1,
            ..Default::default()
        },
    )
    .await;
    let checkout = orchestrator(
        &pool,
        CheckoutSettings {
            release_on_cancel: CouponReleasePolicy::Void,
            ..Default::default()
        },
    );

    let first = checkout
        .place_order(order_request(product, 1, Some(&code), &unique_email()))
        .await
        .unwrap();
    checkout.cancel_order(first.order_id).await.unwrap();
    assert_eq!(active_usages(&pool, coupon_id).await, (0, 0));

    let mut conn = pool.acquire().await.unwrap();
    let usages = RedemptionGuard::usages_for_order(&mut conn, first.order_id).await.unwrap();
    assert_eq!(usages.len(), 1);
    assert_eq!(usages[0].status, UsageStatus::Void);
    assert!(usages[0].voided_at.is_some());
    drop(conn);

    let second = checkout
        .place_order(order_request(product, 1, Some(&code), &unique_email()))
        .await
        .unwrap();
    assert!(second.coupon_applied);
    assert_eq!(active_usages(&pool, coupon_id).await, (1, 1));

    let total_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1")
        .bind(coupon_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(total_rows, 2, "voided usage rows are kept");
}

#[tokio::test]
#[ignore]
async fn test_status_lifecycle_over_http() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 50000, 5).await;
    let state = AppState::new(pool.clone(), CheckoutSettings::default());
    let placed = state
        .orchestrator
        .place_order(order_request(product, 1, None, &unique_email()))
        .await
        .unwrap();
    let server = TestServer::new(create_router(state)).unwrap();
    let path = format!("/orders/{}/status", placed.order_id);

    for status in ["confirmed", "shipping", "done"] {
        let response = server.patch(&path).json(&json!({ "status": status })).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["status"], status);
    }

    let response = server.post(&format!("/orders/{}/cancel", placed.order_id)).await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(StockLedger::available_qty(&pool, product, None).await.unwrap(), 4);

    let missing = server.get(&format!("/orders/{}", Uuid::new_v4())).await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Ledger Tests
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_ledger_reserve_and_rollback_in_one_transaction() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 1000, 3).await;
    let order_id = Uuid::new_v4();
    let mut tx = pool.begin().await.unwrap();

    let too_much = StockDemand { product_id: product, variant_id: None, qty: 4 };
    match StockLedger::reserve(&mut tx, &too_much, order_id).await.unwrap() {
        StockOutcome::Insufficient(shortfall) => assert_eq!(shortfall.missing, 1),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let demand = StockDemand { product_id: product, variant_id: None, qty: 3 };
    match StockLedger::reserve(&mut tx, &demand, order_id).await.unwrap() {
        StockOutcome::Reserved(movement) => {
            assert_eq!(movement.qty, -3);
            assert_eq!(movement.ref_id.as_deref(), Some(order_id.to_string().as_str()));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(StockLedger::available_qty(&mut *tx, product, None).await.unwrap(), 0);

    let compensations = StockLedger::rollback(&mut tx, order_id).await.unwrap();
    assert_eq!(compensations.len(), 1);
    assert!(StockLedger::rollback(&mut tx, order_id).await.unwrap().is_empty());
    tx.commit().await.unwrap();

    assert_eq!(StockLedger::available_qty(&pool, product, None).await.unwrap(), 3);
}

// ============================================================================
// Failure Handling Tests
// ============================================================================

/// A slow COMMIT is not cut short by the attempt timer and is never replayed
#[tokio::test]
#[ignore]
async fn test_slow_commit_is_not_retried_into_a_duplicate_order() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 50000, 10).await;
    let customer_name = format!("Slow commit {}", Uuid::new_v4().simple());

    // The BEFORE trigger runs inside the attempt, the deferred one inside COMMIT;
    // together they outlast the attempt timeout, each alone does not
    let setup = [
        r#"
        CREATE OR REPLACE FUNCTION checkout_test_slow() RETURNS trigger AS $$
        BEGIN
            PERFORM pg_sleep(0.6);
            RETURN NEW;
        END
        $$ LANGUAGE plpgsql
        "#
        .to_string(),
        "DROP TRIGGER IF EXISTS checkout_test_slow_insert ON orders".to_string(),
        "DROP TRIGGER IF EXISTS checkout_test_slow_commit ON orders".to_string(),
        format!(
            "CREATE TRIGGER checkout_test_slow_insert BEFORE INSERT ON orders FOR EACH ROW \
             WHEN (NEW.customer_name = '{customer_name}') EXECUTE FUNCTION checkout_test_slow()"
        ),
        format!(
            "CREATE CONSTRAINT TRIGGER checkout_test_slow_commit AFTER INSERT ON orders \
             DEFERRABLE INITIALLY DEFERRED FOR EACH ROW \
             WHEN (NEW.customer_name = '{customer_name}') EXECUTE FUNCTION checkout_test_slow()"
        ),
    ];
    for statement in &setup {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }

    let checkout = orchestrator(
        &pool,
        CheckoutSettings {
            attempt_timeout: std::time::Duration::from_millis(1000),
            max_retries: 1,
            ..Default::default()
        },
    );
    let mut request = order_request(product, 1, None, &unique_email());
    request.customer.name = customer_name.clone();

    let result = checkout.place_order(request).await;

    for statement in [
        "DROP TRIGGER IF EXISTS checkout_test_slow_insert ON orders",
        "DROP TRIGGER IF EXISTS checkout_test_slow_commit ON orders",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }

    let placed = result.unwrap();
    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE customer_name = $1")
        .bind(&customer_name)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(orders, 1);
    assert_eq!(placed.status, OrderStatus::Pending);
    assert_eq!(StockLedger::available_qty(&pool, product, None).await.unwrap(), 9);
}

/// A product lock held elsewhere exhausts retries without writing or leaking locks
#[tokio::test]
#[ignore]
async fn test_held_product_lock_exhausts_retries_cleanly() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 50000, 5).await;
    let checkout = orchestrator(
        &pool,
        CheckoutSettings {
            lock_timeout: std::time::Duration::from_millis(100),
            attempt_timeout: std::time::Duration::from_millis(1000),
            max_retries: 1,
            retry_base: std::time::Duration::from_millis(10),
            ..Default::default()
        },
    );

    let mut holder = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
        .bind(product)
        .execute(&mut *holder)
        .await
        .unwrap();

    let err = checkout
        .place_order(order_request(product, 1, None, &unique_email()))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::RetriesExhausted { attempts: 2 }), "{err:?}");
    assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

    let outs: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM stock_movements WHERE product_id = $1 AND movement_type = 'OUT'",
    )
    .bind(product)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(outs, 0);

    holder.rollback().await.unwrap();

    checkout
        .place_order(order_request(product, 1, None, &unique_email()))
        .await
        .unwrap();
    assert_eq!(StockLedger::available_qty(&pool, product, None).await.unwrap(), 4);
}

/// A ledger already below zero is reported and left for manual correction
#[tokio::test]
#[ignore]
async fn test_negative_ledger_refuses_checkout() {
    let pool = create_test_pool().await;
    let product = seed_product(&pool, 50000, 0).await;
    sqlx::query(
        "INSERT INTO stock_movements (product_id, qty, movement_type, ref_type, note) \
         VALUES ($1, -3, 'ADJUST', 'manual', 'miscount')",
    )
    .bind(product)
    .execute(&pool)
    .await
    .unwrap();
    let checkout = orchestrator(&pool, CheckoutSettings::default());

    let err = checkout
        .place_order(order_request(product, 1, None, &unique_email()))
        .await
        .unwrap_err();
    match &err {
        CheckoutError::Invariant(message) => assert!(message.contains("-3"), "{message}"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

    let history = StockLedger::history(&pool, product, None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].movement_type, MovementType::Adjust);
}
