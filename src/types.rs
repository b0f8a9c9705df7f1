//! Core value types shared across the matching, position and risk layers.
//!
//! Prices and quantities are fixed-point integers; price is always in
//! micro-units of the quote currency (10⁻⁶), never a binary float.

use serde::{Deserialize, Serialize};

/// Micro-units of the quote currency. 1_000_000 == 1.0 of the quote unit.
pub type Price = i64;

/// Contract/lot quantity, also integer-scaled by the product's contract size.
pub type Quantity = i64;

/// Nanosecond timestamp, monotonic enough for ordering within a process.
pub type Timestamp = u64;

/// 64-bit monotonic order identity (§3).
pub type OrderId = u64;

/// Per-book monotonic trade identity (§3).
pub type TradeId = u64;

pub type UserId = String;
pub type Symbol = String;

pub const MICRO: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Sign used for position deltas: +1 for Buy, -1 for Sell.
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    Ioc,
    Fok,
    PostOnly,
    StopLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    StopPending,
}

impl OrderStatus {
    /// Whether the order can still rest in a book / absorb fills.
    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
    }
}

/// Round `price` to the nearest multiple of `tick` (micro-units), ties
/// rounding toward zero, per §4.1.
///
/// Rust's integer division already truncates toward zero, so the
/// truncated quotient is the tie-toward-zero rounding; only a remainder
/// whose magnitude exceeds half a tick needs to be pushed one tick
/// further away from zero.
pub fn snap_to_tick(price: Price, tick: Price) -> Price {
    if tick <= 0 {
        return price;
    }
    let quotient = price / tick;
    let remainder = price % tick;
    if remainder == 0 {
        return price;
    }
    let away_from_zero = if price >= 0 { quotient + 1 } else { quotient - 1 };
    if remainder.abs() * 2 > tick {
        away_from_zero * tick
    } else {
        quotient * tick
    }
}
