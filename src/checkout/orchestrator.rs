//! Checkout orchestration.
//!
//! One order is one database transaction. Inside it the orchestrator prices
//! the cart from the catalog, evaluates the coupon, reserves stock, reserves
//! the coupon and writes the order. Lock order is fixed for every checkout:
//! product rows in ascending id, then the coupon row. Any rejection or error
//! drops the transaction, which rolls everything back.
//!
//! Retries and the per-attempt timer cover everything up to COMMIT. COMMIT
//! itself runs once, outside the timer and bounded by `statement_timeout`;
//! if it does not confirm, the caller gets `CommitOutcomeUnknown` and the
//! work is never replayed.
//!
//! ```text
//! Validating ─► ReservingStock ─► ReservingCoupon ─► Persisting ─► Committed
//!      │               │                 │                │
//!      └───────────────┴────────► Aborted(reason) ◄───────┘
//! ```

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{Executor, PgConnection, PgPool, Postgres, Transaction};
use tokio::sync::broadcast;
use uuid::Uuid;
use validator::Validate;

use crate::checkout::error::{CheckoutError, CheckoutResult};
use crate::checkout::models::{
    CartItemRequest, CustomerRequest, OrderCommitted, PlaceOrderRequest, PlaceOrderResponse,
    RejectionDetails, ValidateCouponRequest, ValidateCouponResponse,
};
use crate::checkout::retry::RetryPolicy;
use crate::checkout::state_machine::{CheckoutStage, StageTracker};
use crate::config::{CheckoutSettings, CouponExhaustedPolicy, CouponReleasePolicy};
use crate::coupons::{
    CartLine, Coupon, CouponEvaluation, CouponRepository, CouponRule, CouponRuleEvaluator,
    CustomerContext, RedemptionGuard, RedemptionOutcome,
};
use crate::orders::{
    DeliveryMethod, NewOrder, NewOrderDetail, Order, OrderResponse, OrderStatus,
    OrderStatusMachine, OrdersRepository, PriceCalculator, ProductRepository,
};
use crate::rejection::RejectionReason;
use crate::stock::{Shortfall, StockLedger, StockOutcome};

const EVENT_CAPACITY: usize = 256;

/// A cart line priced from the catalog
#[derive(Debug, Clone)]
struct PricedLine {
    variant_id: Option<i64>,
    line: CartLine,
}

/// Result of one attempt, still inside its open transaction
struct Prepared<T> {
    tx: Transaction<'static, Postgres>,
    value: T,
}

/// Composes evaluation, stock and coupon reservation into one transaction per order
pub struct CheckoutOrchestrator {
    pool: PgPool,
    settings: CheckoutSettings,
    retry: RetryPolicy,
    orders: OrdersRepository,
    events: broadcast::Sender<OrderCommitted>,
}

impl CheckoutOrchestrator {
    pub fn new(pool: PgPool, settings: CheckoutSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            retry: RetryPolicy::from_settings(&settings),
            orders: OrdersRepository::new(pool.clone()),
            pool,
            settings,
            events,
        }
    }

    /// Listen for committed orders
    pub fn subscribe(&self) -> broadcast::Receiver<OrderCommitted> {
        self.events.subscribe()
    }

    /// Preview a coupon against a cart; never writes and never touches usage limits
    pub async fn validate_coupon(
        &self,
        request: ValidateCouponRequest,
    ) -> CheckoutResult<ValidateCouponResponse> {
        request.validate()?;

        let now = Utc::now();
        let local_now = self.local_time(now);

        let Some(coupon) = CouponRepository::find_by_code(&self.pool, &request.code).await? else {
            tracing::debug!(code = %request.code, "Coupon not found");
            return Ok(ValidateCouponResponse::rejected(RejectionReason::CouponNotFound));
        };

        let lines = Self::price_cart(&self.pool, &request.cart_items, now).await?;
        let cart: Vec<CartLine> = lines.iter().map(|l| l.line.clone()).collect();

        if let Some(client_subtotal) = request.subtotal {
            let server_subtotal = PriceCalculator::subtotal(&cart.iter().map(CartLine::amount).collect::<Vec<_>>());
            if client_subtotal != server_subtotal {
                tracing::debug!(client_subtotal, server_subtotal, "Client subtotal differs from catalog prices");
            }
        }

        let customer =
            Self::customer_context(&self.pool, &request.customer, request.delivery_method, local_now).await?;
        let rule = CouponRule::try_from(&coupon)?;

        let response = match CouponRuleEvaluator::evaluate(&rule, &cart, &customer, local_now) {
            Ok(evaluation) => ValidateCouponResponse {
                valid: true,
                discount_amount: evaluation.discount_amount,
                free_ship: evaluation.free_ship,
                eligible_subtotal: evaluation.eligible_subtotal,
                reason: None,
                message: "Coupon applied".to_string(),
            },
            Err(reason) => {
                tracing::debug!(coupon_id = coupon.id, reason = reason.code(), "Coupon preview rejected");
                ValidateCouponResponse::rejected(reason)
            }
        };

        Ok(response)
    }

    /// Place an order atomically, retrying transient failures
    pub async fn place_order(&self, request: PlaceOrderRequest) -> CheckoutResult<PlaceOrderResponse> {
        request.validate()?;
        request.customer.identity().validate()?;

        let (response, event, mut tracker) = self
            .commit_once("place_order", || self.place_order_attempt(&request))
            .await?;
        if let Err(e) = tracker.advance(CheckoutStage::Committed) {
            tracing::error!(order_id = %response.order_id, "Stage tracking out of step after commit: {}", e);
        }

        tracing::info!(
            order_id = %response.order_id,
            total = response.total,
            discount = response.discount_amount,
            "Order committed"
        );

        if self.events.send(event).is_err() {
            tracing::debug!(order_id = %response.order_id, "No listeners for committed order");
        }

        Ok(response)
    }

    /// Cancel an order, returning its stock and applying the coupon release policy
    ///
    /// Cancelling an already cancelled order returns it unchanged.
    pub async fn cancel_order(&self, order_id: Uuid) -> CheckoutResult<Order> {
        let order = self.commit_once("cancel_order", || self.cancel_attempt(order_id)).await?;
        tracing::info!(%order_id, "Order cancelled");
        Ok(order)
    }

    /// Move an order forward in its lifecycle
    pub async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> CheckoutResult<Order> {
        if status == OrderStatus::Cancelled {
            return self.cancel_order(order_id).await;
        }
        let order = self
            .commit_once("update_status", || self.update_status_attempt(order_id, status))
            .await?;
        tracing::info!(%order_id, status = %order.status, "Order status updated");
        Ok(order)
    }

    /// Order header with its lines
    pub async fn get_order(&self, order_id: Uuid) -> CheckoutResult<OrderResponse> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;
        let details = OrdersRepository::details(&self.pool, order_id).await?;

        Ok(OrderResponse { order, details })
    }

    async fn place_order_attempt(
        &self,
        request: &PlaceOrderRequest,
    ) -> CheckoutResult<Prepared<(PlaceOrderResponse, OrderCommitted, StageTracker)>> {
        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let local_now = self.local_time(now);
        let identity = request.customer.identity();
        let mut tracker = StageTracker::new();

        let mut tx = self.pool.begin().await?;
        self.apply_timeouts(&mut tx).await?;

        // Validating
        let lines = Self::price_cart(&mut *tx, &request.items, now).await?;
        let cart: Vec<CartLine> = lines.iter().map(|l| l.line.clone()).collect();
        let subtotal = PriceCalculator::subtotal(&cart.iter().map(CartLine::amount).collect::<Vec<_>>());

        let mut candidate: Option<(Coupon, CustomerContext)> = None;
        if let Some(code) = request.coupon_code() {
            let Some(coupon) = CouponRepository::find_by_code(&mut *tx, code).await? else {
                return Err(Self::reject(&mut tracker, RejectionReason::CouponNotFound, Some(code)));
            };
            let customer =
                Self::customer_context(&mut *tx, &request.customer, request.delivery_method, local_now).await?;
            let rule = CouponRule::try_from(&coupon)?;
            if let Err(reason) = CouponRuleEvaluator::evaluate(&rule, &cart, &customer, local_now) {
                return Err(Self::reject(&mut tracker, reason, Some(code)));
            }
            candidate = Some((coupon, customer));
        }

        // ReservingStock
        Self::advance(&mut tracker, CheckoutStage::ReservingStock)?;
        let demands = StockLedger::merge_demands(
            lines
                .iter()
                .map(|l| (l.line.product_id, l.variant_id, i64::from(l.line.qty))),
        );
        let outcomes = StockLedger::reserve_all(&mut *tx, &demands, order_id).await?;
        let shortfalls: Vec<Shortfall> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                StockOutcome::Insufficient(shortfall) => Some(shortfall),
                StockOutcome::Reserved(_) => None,
            })
            .collect();
        if !shortfalls.is_empty() {
            let reason = tracker.abort(RejectionReason::InsufficientStock);
            return Err(CheckoutError::Rejected {
                reason,
                details: RejectionDetails {
                    shortfalls,
                    coupon_code: None,
                },
            });
        }

        // ReservingCoupon
        Self::advance(&mut tracker, CheckoutStage::ReservingCoupon)?;
        let mut applied: Option<(i64, CouponEvaluation, i64)> = None;
        if let Some((coupon, customer)) = candidate {
            match RedemptionGuard::try_reserve(&mut *tx, coupon.id, &identity).await? {
                RedemptionOutcome::Granted(locked) => {
                    // The row may have changed since the unlocked read
                    let rule = CouponRule::try_from(&locked)?;
                    let evaluation = match CouponRuleEvaluator::evaluate(&rule, &cart, &customer, local_now) {
                        Ok(evaluation) => evaluation,
                        Err(reason) => {
                            return Err(Self::reject(&mut tracker, reason, Some(&locked.code)));
                        }
                    };
                    let usage = RedemptionGuard::record_usage(
                        &mut *tx,
                        locked.id,
                        &identity,
                        subtotal,
                        evaluation.discount_amount,
                    )
                    .await?;
                    applied = Some((locked.id, evaluation, usage.id));
                }
                RedemptionOutcome::Rejected(reason) => {
                    let droppable = matches!(
                        reason,
                        RejectionReason::LimitReached | RejectionReason::PerCustomerLimitReached
                    );
                    if droppable && self.settings.exhausted_policy == CouponExhaustedPolicy::DropCoupon {
                        tracing::info!(
                            coupon_id = coupon.id,
                            reason = reason.code(),
                            "Coupon exhausted; placing order without it"
                        );
                    } else {
                        return Err(Self::reject(&mut tracker, reason, Some(&coupon.code)));
                    }
                }
            }
        }

        // Persisting
        Self::advance(&mut tracker, CheckoutStage::Persisting)?;
        let discount_amount = applied.as_ref().map_or(0, |(_, e, _)| e.discount_amount);
        let free_ship = applied.as_ref().map_or(false, |(_, e, _)| e.free_ship);
        let shipping_fee = self.shipping_fee(request.delivery_method, free_ship);
        let total = PriceCalculator::order_total(subtotal, discount_amount, shipping_fee);
        let coupon_id = applied.as_ref().map(|(id, _, _)| *id);

        let new_order = NewOrder {
            id: order_id,
            user_id: identity.user_id,
            customer_name: request.customer.name.trim().to_string(),
            customer_email: identity.email.clone(),
            customer_phone: identity.phone.clone(),
            delivery_method: request.delivery_method,
            subtotal,
            discount_amount,
            shipping_fee,
            total,
            coupon_id,
        };
        let details: Vec<NewOrderDetail> = lines
            .iter()
            .map(|l| NewOrderDetail {
                product_id: l.line.product_id,
                variant_id: l.variant_id,
                qty: l.line.qty,
                price: l.line.unit_price,
                amount: PriceCalculator::line_amount(l.line.qty, l.line.unit_price),
            })
            .collect();

        let (order, _) = OrdersRepository::insert(&mut *tx, &new_order, &details).await?;
        if let Some((_, _, usage_id)) = applied {
            RedemptionGuard::attach_order(&mut *tx, usage_id, order.id).await?;
        }

        let response = PlaceOrderResponse {
            order_id: order.id,
            subtotal,
            discount_amount,
            shipping_fee,
            total,
            status: order.status,
            coupon_applied: coupon_id.is_some(),
        };
        let event = OrderCommitted {
            order_id: order.id,
            total,
            coupon_id,
            customer_email: order.customer_email.clone(),
            committed_at: Utc::now(),
        };

        Ok(Prepared {
            tx,
            value: (response, event, tracker),
        })
    }

    async fn cancel_attempt(&self, order_id: Uuid) -> CheckoutResult<Prepared<Order>> {
        let mut tx = self.pool.begin().await?;
        self.apply_timeouts(&mut tx).await?;

        let order = OrdersRepository::lock_by_id(&mut *tx, order_id).await?;
        OrderStatusMachine::transition(order.status, OrderStatus::Cancelled)
            .map_err(CheckoutError::InvalidTransition)?;

        if !OrderStatusMachine::releases_stock(order.status, OrderStatus::Cancelled) {
            tracing::debug!(%order_id, "Order already cancelled");
            return Ok(Prepared { tx, value: order });
        }

        let compensations = StockLedger::rollback(&mut *tx, order_id).await?;

        let voided = match self.settings.release_on_cancel {
            CouponReleasePolicy::Void => RedemptionGuard::void_for_order(&mut *tx, order_id).await?.len(),
            CouponReleasePolicy::Consume => 0,
        };

        let updated = OrdersRepository::update_status(&mut *tx, order_id, OrderStatus::Cancelled).await?;

        tracing::debug!(
            %order_id,
            from = %order.status,
            stock_movements = compensations.len(),
            voided_usages = voided,
            "Cancellation prepared"
        );

        Ok(Prepared { tx, value: updated })
    }

    async fn update_status_attempt(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> CheckoutResult<Prepared<Order>> {
        let mut tx = self.pool.begin().await?;
        self.apply_timeouts(&mut tx).await?;

        let order = OrdersRepository::lock_by_id(&mut *tx, order_id).await?;
        if order.status == status {
            return Ok(Prepared { tx, value: order });
        }
        OrderStatusMachine::transition(order.status, status).map_err(CheckoutError::InvalidTransition)?;

        let updated = OrdersRepository::update_status(&mut *tx, order_id, status).await?;
        tracing::debug!(%order_id, from = %order.status, to = %status, "Status change prepared");

        Ok(Prepared { tx, value: updated })
    }

    /// Retry `attempt` until it prepares its transaction, then commit exactly once
    ///
    /// A commit error is reported as [`CheckoutError::CommitOutcomeUnknown`]:
    /// the server may have applied it, so replaying the attempt could apply it twice.
    async fn commit_once<T, F, Fut>(&self, operation: &'static str, attempt: F) -> CheckoutResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CheckoutResult<Prepared<T>>>,
    {
        let Prepared { tx, value } = self.with_retry(operation, attempt).await?;

        tx.commit().await.map_err(|e| {
            tracing::error!(operation, error = %e, "Commit did not confirm; outcome unknown");
            CheckoutError::CommitOutcomeUnknown(e)
        })?;

        Ok(value)
    }

    /// Run `op` with a per-attempt timeout, retrying transient failures with backoff
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut op: F) -> CheckoutResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CheckoutResult<T>>,
    {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 1;

        loop {
            // An expired attempt is dropped mid-flight; its transaction rolls back on drop
            let result = match tokio::time::timeout(self.retry.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(CheckoutError::Timeout),
            };

            match result {
                Err(err) if err.is_transient() => {
                    if attempt >= max_attempts {
                        tracing::warn!(operation, attempts = attempt, error = %err, "Giving up after transient failures");
                        return Err(CheckoutError::RetriesExhausted { attempts: attempt });
                    }
                    let delay = self.retry.backoff_with_jitter(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn apply_timeouts(&self, conn: &mut PgConnection) -> CheckoutResult<()> {
        // SET does not accept bind parameters; both values are integers from config
        let lock_ms = self.settings.lock_timeout.as_millis();
        let statement_ms = self.retry.attempt_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL lock_timeout = '{lock_ms}ms'"))
            .execute(&mut *conn)
            .await?;
        sqlx::query(&format!("SET LOCAL statement_timeout = '{statement_ms}ms'"))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Resolve catalog prices for every cart line
    async fn price_cart<'e, E>(
        executor: E,
        items: &[CartItemRequest],
        now: DateTime<Utc>,
    ) -> CheckoutResult<Vec<PricedLine>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let mut ids: Vec<i64> = items.iter().map(|i| i.product_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let products: HashMap<i64, _> = ProductRepository::find_by_ids(executor, &ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        items
            .iter()
            .map(|item| {
                let product = products
                    .get(&item.product_id)
                    .filter(|p| p.is_active())
                    .ok_or_else(|| {
                        CheckoutError::InvalidInput(format!("Product {} is not available", item.product_id))
                    })?;
                let (unit_price, is_on_sale) = product.effective_price(now);

                Ok(PricedLine {
                    variant_id: item.variant_id,
                    line: CartLine {
                        product_id: product.id,
                        category_id: product.category_id,
                        qty: item.qty,
                        unit_price,
                        is_on_sale,
                    },
                })
            })
            .collect()
    }

    async fn customer_context<'e, E>(
        executor: E,
        customer: &CustomerRequest,
        delivery_method: DeliveryMethod,
        local_now: NaiveDateTime,
    ) -> CheckoutResult<CustomerContext>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let identity = customer.identity();
        let previous_orders = if identity.is_anonymous() {
            0
        } else {
            OrdersRepository::count_for_customer(
                executor,
                identity.user_id,
                identity.email.as_deref(),
                identity.phone.as_deref(),
            )
            .await?
        };

        Ok(CustomerContext {
            is_new_customer: previous_orders == 0,
            birthday_today: customer.birthday_on(local_now.date()),
            email: identity.normalized_email(),
            user_id: identity.user_id,
            requested_delivery_method: delivery_method,
        })
    }

    fn shipping_fee(&self, delivery_method: DeliveryMethod, free_ship: bool) -> i64 {
        if delivery_method == DeliveryMethod::Pickup || free_ship {
            0
        } else {
            self.settings.shipping_fee
        }
    }

    fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.settings.store_offset).naive_local()
    }

    fn advance(tracker: &mut StageTracker, stage: CheckoutStage) -> CheckoutResult<()> {
        tracker.advance(stage).map_err(CheckoutError::Invariant)
    }

    fn reject(tracker: &mut StageTracker, reason: RejectionReason, code: Option<&str>) -> CheckoutError {
        let reason = tracker.abort(reason);
        CheckoutError::Rejected {
            reason,
            details: RejectionDetails {
                shortfalls: Vec::new(),
                coupon_code: code.filter(|_| reason.is_coupon_reason()).map(str::to_string),
            },
        }
    }
}
