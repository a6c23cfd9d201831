use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Kind of stock movement
///
/// IN and ROLLBACK_IN carry positive quantities, OUT negative ones.
/// ADJUST is written only by the back office and may carry either sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,
    Out,
    RollbackIn,
    Adjust,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MovementStatus {
    Active,
    Void,
}

/// One row of the stock ledger
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct StockMovement {
    pub id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub qty: i32,
    pub movement_type: MovementType,
    pub ref_type: String,
    pub ref_id: Option<String>,
    pub note: Option<String>,
    pub status: MovementStatus,
    pub created_at: DateTime<Utc>,
}

/// Reference types written by the checkout core
pub const REF_ORDER: &str = "order";

/// Quantity wanted from one stock pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct StockDemand {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub qty: i64,
}

/// Why a demand could not be served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Shortfall {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub requested: i64,
    pub available: i64,
    pub missing: i64,
}

/// Result of reserving one demand
#[derive(Debug, Clone)]
pub enum StockOutcome {
    Reserved(StockMovement),
    Insufficient(Shortfall),
}

/// Current level of one stock pool with its journal
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockLevel {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub available_qty: i64,
    pub movements: Vec<StockMovement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_type_wire_names() {
        assert_eq!(serde_json::to_string(&MovementType::RollbackIn).unwrap(), "\"ROLLBACK_IN\"");
        assert_eq!(serde_json::to_string(&MovementType::Out).unwrap(), "\"OUT\"");
    }
}
