//! Prelude module that re-exports the types most call sites need.
//!
//! ```rust
//! use exchange_core::prelude::*;
//! ```

// Core value types
pub use crate::types::{
    OrderId, OrderStatus, OrderType, Price, Quantity, Side, Symbol, Timestamp, TradeId, MICRO,
};

// Errors
pub use crate::error::{ExchangeError, Result};

// Catalog (C1) and rates (C2)
pub use crate::catalog::{HedgeMode, Product, ProductCatalog, ProductCategory};
pub use crate::rates::{RateEntry, RateProvider};

// Order book (C4) and matching engine (C5)
pub use crate::engine::MatchingEngine;
pub use crate::orderbook::{FeeSchedule, Order, OrderBook, Trade};

// Position / margin / risk / circuit (C6-C9)
pub use crate::margin::{initial_margin, liquidation_price, maintenance_margin, should_liquidate};
pub use crate::position::{Account, InsuranceFund, Position, PositionManager};
pub use crate::risk::{RiskEngine, UserRiskLimits};
pub use crate::circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Mark price (C10)
pub use crate::markprice::composite_mark;

// Journal (C3)
pub use crate::journal::{EventType, FileJournal, Journal, JournalEvent};

// Sequencer (C11) and composition root (C12, C13)
pub use crate::sequencer::{Command, CommandResponse, Sequencer};
pub use crate::context::ExchangeContext;
pub use crate::scheduler::Scheduler;
