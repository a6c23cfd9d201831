use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Order status enum representing the lifecycle of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipping,
    Done,
    Cancelled,
}

impl OrderStatus {
    /// Convert status to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Done => "done",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "shipping" => Ok(OrderStatus::Shipping),
            "done" => Ok(OrderStatus::Done),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the customer receives the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Pickup,
    Delivery,
}

impl Default for DeliveryMethod {
    fn default() -> Self {
        DeliveryMethod::Delivery
    }
}

impl std::fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryMethod::Pickup => write!(f, "pickup"),
            DeliveryMethod::Delivery => write!(f, "delivery"),
        }
    }
}

/// Catalog product, read-only to the checkout core
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price_buy: i64,
    pub price_sale: Option<i64>,
    pub sale_start: Option<DateTime<Utc>>,
    pub sale_end: Option<DateTime<Utc>>,
    pub category_id: i64,
    pub status: String,
}

impl Product {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// Unit price charged at `now`, and whether it is the sale price
    ///
    /// The sale price applies when set and `now` falls inside the sale
    /// window; a missing bound leaves that side of the window open.
    pub fn effective_price(&self, now: DateTime<Utc>) -> (i64, bool) {
        match self.price_sale {
            Some(sale)
                if self.sale_start.map_or(true, |start| now >= start)
                    && self.sale_end.map_or(true, |end| now <= end) =>
            {
                (sale, true)
            }
            _ => (self.price_buy, false),
        }
    }
}

/// Domain model representing an order in the database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<i64>,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub delivery_method: DeliveryMethod,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub shipping_fee: i64,
    pub total: i64,
    pub coupon_id: Option<i64>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Domain model representing a line within an order
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct OrderDetail {
    pub id: i64,
    pub order_id: Uuid,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub qty: i32,
    /// Unit price snapshot at checkout
    pub price: i64,
    pub amount: i64,
}

/// Header values for a new order, written once per checkout
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: Option<i64>,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub delivery_method: DeliveryMethod,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub shipping_fee: i64,
    pub total: i64,
    pub coupon_id: Option<i64>,
}

/// Line values for a new order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderDetail {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub qty: i32,
    pub price: i64,
    pub amount: i64,
}

/// Request DTO for updating order status
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// Response DTO for an order with its lines
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub details: Vec<OrderDetail>,
}
