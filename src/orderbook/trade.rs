//! Trade record (§3) and the callback types the book/engine use to
//! publish them, grounded on the teacher's `orderbook/trade.rs`
//! `TradeResult`/`TradeListener` shape.

use std::sync::Arc;

use crate::types::{OrderId, Price, Side, Timestamp, TradeId};

#[derive(Debug, Clone)]
pub struct Trade {
    pub id: TradeId,
    pub symbol: String,
    pub maker_order_id: OrderId,
    pub maker_owner: String,
    pub taker_order_id: OrderId,
    pub taker_owner: String,
    pub taker_side: Side,
    pub price: Price,
    pub quantity: i64,
    pub maker_fee: i64,
    pub taker_fee: i64,
    pub timestamp: Timestamp,
}

/// Invoked once per produced trade, on the sequencer thread. Must not
/// block (§6 "Callbacks").
pub type TradeListener = Arc<dyn Fn(&Trade) + Send + Sync>;

/// Invoked on every order-state change (new/partial/filled/cancelled/
/// rejected), on the sequencer thread.
pub type OrderListener = Arc<dyn Fn(&crate::orderbook::order::Order) + Send + Sync>;
