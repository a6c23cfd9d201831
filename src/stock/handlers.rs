// HTTP handlers for stock endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{ApiError, ErrorResponse};
use crate::stock::StockLevel;

/// Query parameters for a stock lookup
#[derive(Debug, Deserialize, IntoParams)]
pub struct StockQuery {
    /// Variant pool; omit for the product's base pool
    pub variant_id: Option<i64>,
}

/// Handler for GET /stock/:product_id
/// Returns the available quantity and the movement journal of one pool
#[utoipa::path(
    get,
    path = "/stock/{product_id}",
    params(
        ("product_id" = i64, Path, description = "Product ID"),
        StockQuery
    ),
    responses(
        (status = 200, description = "Stock level with movement history", body = StockLevel),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "stock"
)]
pub async fn get_stock_handler(
    State(state): State<crate::AppState>,
    Path(product_id): Path<i64>,
    Query(query): Query<StockQuery>,
) -> Result<Json<StockLevel>, ApiError> {
    tracing::debug!(product_id, variant_id = ?query.variant_id, "Fetching stock level");

    let level = state.ledger.level(product_id, query.variant_id).await?;

    Ok(Json(level))
}
