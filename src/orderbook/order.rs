//! Resting order representation (§3). A single mutable struct, not a
//! variant-per-order-type enum — the teacher's `pricelevel`-backed
//! `OrderType<T>` is an enum of order shapes (standard/iceberg/post-only/
//! etc); spec's model is simpler and is followed here instead: one
//! `Order` struct whose `order_type` field selects behavior.

use crate::types::{OrderId, OrderStatus, OrderType, Price, Side, Timestamp};

#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub owner: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Micro-units; 0 for Market.
    pub limit_price: Price,
    /// Micro-units; 0 for non-stop orders.
    pub stop_price: Price,
    pub original_qty: i64,
    pub filled_qty: i64,
    pub remaining_qty: i64,
    pub status: OrderStatus,
    pub reduce_only: bool,
    pub triggered: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub client_id: Option<String>,
}

impl Order {
    pub fn is_resting_type(&self) -> bool {
        matches!(self.order_type, OrderType::Limit | OrderType::PostOnly)
    }

    /// Apply a fill of `qty` at this order's side of the trade. Keeps the
    /// `filled + remaining = original` invariant (§3) and advances status
    /// monotonically.
    pub fn apply_fill(&mut self, qty: i64, now: Timestamp) {
        debug_assert!(qty > 0 && qty <= self.remaining_qty);
        self.filled_qty += qty;
        self.remaining_qty -= qty;
        self.status = if self.remaining_qty == 0 {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = now;
    }

    pub fn cancel(&mut self, now: Timestamp) {
        self.status = OrderStatus::Cancelled;
        self.updated_at = now;
    }

    pub fn reject(&mut self, now: Timestamp) {
        self.status = OrderStatus::Rejected;
        self.updated_at = now;
    }
}
