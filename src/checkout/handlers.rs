// HTTP handlers for checkout and order endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::checkout::error::{CheckoutError, RejectionResponse};
use crate::checkout::models::{
    PlaceOrderRequest, PlaceOrderResponse, ValidateCouponRequest, ValidateCouponResponse,
};
use crate::error::ErrorResponse;
use crate::orders::{Order, OrderResponse, UpdateStatusRequest};

/// Handler for POST /checkout/validate-coupon
/// Previews a coupon against a cart without reserving anything
#[utoipa::path(
    post,
    path = "/checkout/validate-coupon",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Evaluation result; rejections are reported in the body", body = ValidateCouponResponse),
        (status = 422, description = "Invalid input data", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "checkout"
)]
pub async fn validate_coupon_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<Json<ValidateCouponResponse>, CheckoutError> {
    tracing::debug!(code = %request.code, items = request.cart_items.len(), "Validating coupon");

    let response = state.orchestrator.validate_coupon(request).await?;

    Ok(Json(response))
}

/// Handler for POST /checkout/place-order
/// Places an order in a single transaction
#[utoipa::path(
    post,
    path = "/checkout/place-order",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order committed", body = PlaceOrderResponse),
        (status = 409, description = "Checkout rejected", body = RejectionResponse),
        (status = 422, description = "Invalid input data", body = ErrorResponse),
        (status = 503, description = "Store busy, try again", body = ErrorResponse)
    ),
    tag = "checkout"
)]
pub async fn place_order_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlaceOrderResponse>), CheckoutError> {
    tracing::debug!(
        items = request.items.len(),
        coupon = ?request.coupon_code,
        delivery = %request.delivery_method,
        "Placing order"
    );

    let response = state.orchestrator.place_order(request).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Handler for GET /orders/:order_id
/// Retrieves an order with its lines
#[utoipa::path(
    get,
    path = "/orders/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn get_order_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, CheckoutError> {
    let order = state.orchestrator.get_order(order_id).await?;
    Ok(Json(order))
}

/// Handler for POST /orders/:order_id/cancel
/// Cancels an order and returns its stock
#[utoipa::path(
    post,
    path = "/orders/{order_id}/cancel",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled", body = Order),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order can no longer be cancelled", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn cancel_order_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, CheckoutError> {
    let order = state.orchestrator.cancel_order(order_id).await?;
    Ok(Json(order))
}

/// Handler for PATCH /orders/:order_id/status
/// Moves an order along its lifecycle
#[utoipa::path(
    patch,
    path = "/orders/{order_id}/status",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = Order),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Invalid status transition", body = ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn update_status_handler(
    State(state): State<crate::AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, CheckoutError> {
    let order = state.orchestrator.update_status(order_id, request.status).await?;
    Ok(Json(order))
}
