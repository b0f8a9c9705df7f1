//! The flat error taxonomy carried as a tagged result on every fallible
//! operation (§7). Written in the teacher's manual-`Display` style
//! (`orderbook/error.rs`) rather than derived with `thiserror`, since this
//! is the crate's most call-site-visible error type.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExchangeError {
    ProductUnknown { symbol: String },
    ProductInactive { symbol: String },

    PriceOffTick { price: i64, tick: i64 },
    PriceNonPositive { price: i64 },

    QuantityBelowMin { quantity: i64, min: i64 },
    QuantityAboveMax { quantity: i64, max: i64 },
    QuantityNonPositive { quantity: i64 },
    NotionalBelowMin { notional: i64, min: i64 },

    InsufficientFunds { requested: i64, available: i64 },
    InsufficientMargin { required: i64, available: i64 },

    OrderNotFound { order_id: u64 },
    OrderNotModifiable { order_id: u64, reason: &'static str },

    RateLimitExceeded { user: String },
    PositionLimitExceeded { user: String, symbol: String },
    DailyLossLimit { user: String },
    FatFingerPrice { price: i64, reference: i64 },

    MarketHalted,
    SymbolLimitUp { symbol: String },
    SymbolLimitDown { symbol: String },
    SymbolHalted { symbol: String },

    SelfMatchCancelled { order_id: u64 },

    JournalCorrupt { detail: String },
    JournalIoFailure { detail: String },

    SequencerUnresponsive,
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeError::ProductUnknown { symbol } => {
                write!(f, "unknown product: {symbol}")
            }
            ExchangeError::ProductInactive { symbol } => {
                write!(f, "product inactive: {symbol}")
            }
            ExchangeError::PriceOffTick { price, tick } => {
                write!(f, "price {price} is not on a {tick} tick")
            }
            ExchangeError::PriceNonPositive { price } => {
                write!(f, "price must be positive, got {price}")
            }
            ExchangeError::QuantityBelowMin { quantity, min } => {
                write!(f, "quantity {quantity} below minimum {min}")
            }
            ExchangeError::QuantityAboveMax { quantity, max } => {
                write!(f, "quantity {quantity} above maximum {max}")
            }
            ExchangeError::QuantityNonPositive { quantity } => {
                write!(f, "quantity must be positive, got {quantity}")
            }
            ExchangeError::NotionalBelowMin { notional, min } => {
                write!(f, "notional {notional} below minimum {min}")
            }
            ExchangeError::InsufficientFunds {
                requested,
                available,
            } => {
                write!(f, "insufficient funds: requested {requested}, available {available}")
            }
            ExchangeError::InsufficientMargin {
                required,
                available,
            } => {
                write!(f, "insufficient margin: required {required}, available {available}")
            }
            ExchangeError::OrderNotFound { order_id } => {
                write!(f, "order not found: {order_id}")
            }
            ExchangeError::OrderNotModifiable { order_id, reason } => {
                write!(f, "order {order_id} not modifiable: {reason}")
            }
            ExchangeError::RateLimitExceeded { user } => {
                write!(f, "rate limit exceeded for user {user}")
            }
            ExchangeError::PositionLimitExceeded { user, symbol } => {
                write!(f, "position limit exceeded for {user} on {symbol}")
            }
            ExchangeError::DailyLossLimit { user } => {
                write!(f, "daily loss limit reached for user {user}")
            }
            ExchangeError::FatFingerPrice { price, reference } => {
                write!(f, "price {price} deviates too far from reference {reference}")
            }
            ExchangeError::MarketHalted => write!(f, "market is halted"),
            ExchangeError::SymbolLimitUp { symbol } => {
                write!(f, "{symbol} is limit-up")
            }
            ExchangeError::SymbolLimitDown { symbol } => {
                write!(f, "{symbol} is limit-down")
            }
            ExchangeError::SymbolHalted { symbol } => {
                write!(f, "{symbol} is halted")
            }
            ExchangeError::SelfMatchCancelled { order_id } => {
                write!(f, "resting order {order_id} cancelled by self-trade prevention")
            }
            ExchangeError::JournalCorrupt { detail } => {
                write!(f, "journal corrupt: {detail}")
            }
            ExchangeError::JournalIoFailure { detail } => {
                write!(f, "journal I/O failure: {detail}")
            }
            ExchangeError::SequencerUnresponsive => {
                write!(f, "sequencer did not respond within the timeout")
            }
        }
    }
}

impl std::error::Error for ExchangeError {}

impl From<crate::journal::JournalError> for ExchangeError {
    fn from(e: crate::journal::JournalError) -> Self {
        match e {
            crate::journal::JournalError::Corrupt(detail) => {
                ExchangeError::JournalCorrupt { detail }
            }
            other => ExchangeError::JournalIoFailure {
                detail: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
