pub mod checkout;
pub mod config;
pub mod coupons;
pub mod db;
pub mod error;
pub mod orders;
pub mod rejection;
pub mod stock;
pub mod validation;

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use checkout::CheckoutOrchestrator;
use config::CheckoutSettings;
use error::{ApiError, ErrorResponse};
use stock::StockLedger;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        checkout::handlers::validate_coupon_handler,
        checkout::handlers::place_order_handler,
        checkout::handlers::get_order_handler,
        checkout::handlers::cancel_order_handler,
        checkout::handlers::update_status_handler,
        stock::handlers::get_stock_handler,
        health,
    ),
    components(schemas(
        checkout::CartItemRequest,
        checkout::CustomerRequest,
        checkout::ValidateCouponRequest,
        checkout::ValidateCouponResponse,
        checkout::PlaceOrderRequest,
        checkout::PlaceOrderResponse,
        checkout::RejectionDetails,
        checkout::RejectionResponse,
        orders::Order,
        orders::OrderDetail,
        orders::OrderResponse,
        orders::OrderStatus,
        orders::DeliveryMethod,
        orders::UpdateStatusRequest,
        stock::StockLevel,
        stock::StockMovement,
        stock::MovementType,
        stock::MovementStatus,
        stock::Shortfall,
        rejection::RejectionReason,
        error::ErrorResponse,
        HealthResponse,
    )),
    tags(
        (name = "checkout", description = "Coupon preview and order placement"),
        (name = "orders", description = "Order lifecycle"),
        (name = "stock", description = "Stock ledger reads"),
        (name = "health", description = "Service health")
    ),
    info(
        title = "Checkout Core API",
        version = "0.1.0",
        description = "Coupon evaluation, usage limits, stock ledger and atomic checkout"
    )
)]
pub struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub orchestrator: Arc<CheckoutOrchestrator>,
    pub ledger: StockLedger,
}

impl AppState {
    pub fn new(db: PgPool, settings: CheckoutSettings) -> Self {
        Self {
            orchestrator: Arc::new(CheckoutOrchestrator::new(db.clone(), settings)),
            ledger: StockLedger::new(db.clone()),
            db,
        }
    }
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Handler for GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database reachable", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = ErrorResponse)
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    db::ping(&state.db)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    // Configure CORS to allow all origins, methods, and headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health))
        .route("/checkout/validate-coupon", post(checkout::validate_coupon_handler))
        .route("/checkout/place-order", post(checkout::place_order_handler))
        .route("/orders/:order_id", get(checkout::get_order_handler))
        .route("/orders/:order_id/cancel", post(checkout::cancel_order_handler))
        .route("/orders/:order_id/status", patch(checkout::update_status_handler))
        .route("/stock/:product_id", get(stock::get_stock_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
