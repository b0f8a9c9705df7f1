//! # exchange-core
//!
//! The matching, accounting and risk core of a derivatives exchange:
//! an order-matching engine, a position/margin manager, a pre-trade
//! risk engine, a per-symbol circuit breaker, a composite mark-price
//! updater, an append-only crash-recoverable event journal, and a
//! single-consumer command sequencer that serializes every mutating
//! operation against all of the above.
//!
//! ## Architecture
//!
//! Every component that can be read concurrently without going
//! through the sequencer (the product catalog, the rate provider, the
//! circuit breaker's state, positions and accounts) is backed by a
//! `dashmap::DashMap` or an atomic, so observers never block behind
//! order flow. Every operation that *mutates* matching state —
//! submitting, cancelling or modifying an order, adjusting margin,
//! halting a symbol — is serialized through the [`sequencer`] onto a
//! single consumer thread, the same design the teacher crate uses for
//! its order book's internal mutation path, generalized here to the
//! whole exchange rather than one book.
//!
//! [`context::ExchangeContext`] is the composition root: it owns the
//! catalog, the matching engine, the position manager, the risk
//! engine, the circuit breaker, the journal and the sequencer, and
//! wires the matching engine's trade/order callbacks to the position
//! manager, circuit breaker and journal once at construction time.
//! There is no global/singleton state outside of a process-wide
//! monotonic order-id counter (§9).
//!
//! ## Status
//! This crate is a reference implementation of the exchange-core
//! domain described in its design documents; it has not been through
//! a security or correctness audit and is not yet suitable for
//! handling real funds.

pub mod catalog;
pub mod circuit;
pub mod context;
pub mod engine;
pub mod error;
pub mod journal;
pub mod margin;
pub mod markprice;
pub mod orderbook;
pub mod position;
pub mod prelude;
pub mod rates;
pub mod risk;
pub mod scheduler;
pub mod sequencer;
pub mod types;
mod utils;

pub use catalog::{HedgeMode, Product, ProductCatalog, ProductCategory};
pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use context::ExchangeContext;
pub use engine::MatchingEngine;
pub use error::{ExchangeError, Result};
pub use journal::{EventType, FileJournal, Journal, JournalEvent};
pub use margin::{initial_margin, liquidation_price, maintenance_margin, should_liquidate};
pub use markprice::composite_mark;
pub use orderbook::{FeeSchedule, Order, OrderBook, Trade};
pub use position::{Account, InsuranceFund, Position, PositionManager};
pub use rates::RateProvider;
pub use risk::{RiskEngine, UserRiskLimits};
pub use scheduler::Scheduler;
pub use sequencer::{Command, CommandResponse, Sequencer};
pub use types::{OrderId, OrderStatus, OrderType, Price, Quantity, Side, Symbol, Timestamp, TradeId};
