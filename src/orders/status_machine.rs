use crate::orders::OrderStatus;

/// Service for managing order status transitions
pub struct OrderStatusMachine;

impl OrderStatusMachine {
    /// Check if a status transition is valid
    ///
    /// # Valid Transitions
    /// - Pending → Confirmed, Cancelled
    /// - Confirmed → Shipping, Cancelled
    /// - Shipping → Done, Cancelled
    /// - Done → (terminal)
    /// - Cancelled → (terminal)
    /// - Any status → Same status (idempotent)
    pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        // Same status is always valid (idempotent)
        if from == to {
            return true;
        }

        match (from, to) {
            (OrderStatus::Pending, OrderStatus::Confirmed) => true,
            (OrderStatus::Pending, OrderStatus::Cancelled) => true,

            (OrderStatus::Confirmed, OrderStatus::Shipping) => true,
            (OrderStatus::Confirmed, OrderStatus::Cancelled) => true,

            (OrderStatus::Shipping, OrderStatus::Done) => true,
            (OrderStatus::Shipping, OrderStatus::Cancelled) => true,

            // Delivered orders are not cancelled here; returns go through the back office
            (OrderStatus::Done, _) => false,
            (OrderStatus::Cancelled, _) => false,

            _ => false,
        }
    }

    /// Attempt to transition from one status to another
    ///
    /// # Returns
    /// `Ok(to)` if the transition is valid, `Err(message)` otherwise
    pub fn transition(from: OrderStatus, to: OrderStatus) -> Result<OrderStatus, String> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(format!("Invalid status transition from {} to {}", from, to))
        }
    }

    /// Whether leaving `from` for `to` must give stock back
    pub fn releases_stock(from: OrderStatus, to: OrderStatus) -> bool {
        from != OrderStatus::Cancelled && to == OrderStatus::Cancelled
    }
}
