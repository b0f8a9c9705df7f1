//! C12 — Exchange Context: the explicit, no-singleton composition root
//! (§9 Design Notes) that wires C1–C11 together and exposes the command
//! interface from §6. Grounded on `original_source/src/exchange_factory.h`'s
//! "Blackbox Facade" (its own words: "Orders go IN, trades + ledger
//! entries come OUT. No direct manipulation of internal state.") —
//! reimplemented without its global-singleton `instance()` accessors,
//! constructing every component explicitly instead.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::catalog::ProductCatalog;
use crate::circuit::CircuitBreaker;
use crate::engine::MatchingEngine;
use crate::error::{ExchangeError, Result};
use crate::journal::{FileJournal, Journal, JournalEvent};
use crate::orderbook::{Order, Trade};
use crate::position::{Account, Position, PositionManager};
use crate::rates::RateProvider;
use crate::risk::RiskEngine;
use crate::sequencer::{Command, CommandResponse, Sequencer};
use crate::types::{OrderId, OrderStatus, OrderType, Price, Side, Symbol};
use crate::utils::now_micros;

const SEQUENCER_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ExchangeContext {
    pub catalog: Arc<ProductCatalog>,
    pub rates: Arc<RateProvider>,
    pub engine: Arc<MatchingEngine>,
    pub positions: Arc<PositionManager>,
    pub risk: Arc<RiskEngine>,
    pub circuit: Arc<CircuitBreaker>,
    pub journal: Arc<FileJournal>,
    sequencer: Sequencer,
}

impl ExchangeContext {
    pub fn new(
        catalog: Arc<ProductCatalog>,
        rates: Arc<RateProvider>,
        risk: Arc<RiskEngine>,
        circuit: Arc<CircuitBreaker>,
        journal: Arc<FileJournal>,
        queue_capacity: usize,
    ) -> Self {
        let positions = Arc::new(PositionManager::new(catalog.clone()).with_journal(journal.clone()));

        let mut engine = MatchingEngine::new(catalog.clone());
        {
            let positions = positions.clone();
            let circuit = circuit.clone();
            let journal = journal.clone();
            engine.set_trade_listener(Arc::new(move |trade: &Trade| {
                positions.apply_trade(trade, &trade.maker_owner, false);
                positions.apply_trade(trade, &trade.taker_owner, true);
                circuit.on_trade(&trade.symbol, trade.price);
                if let Err(e) = journal.append(JournalEvent::Trade {
                    id: trade.id,
                    symbol: trade.symbol.clone(),
                    maker_user: trade.maker_owner.clone(),
                    taker_user: trade.taker_owner.clone(),
                    maker_oid: trade.maker_order_id,
                    taker_oid: trade.taker_order_id,
                    taker_side: trade.taker_side,
                    price_micro: trade.price,
                    qty: trade.quantity,
                    maker_fee: trade.maker_fee,
                    taker_fee: trade.taker_fee,
                    ts: trade.timestamp,
                }) {
                    warn!(error = %e, "journal append failed for trade");
                }
            }));
        }
        {
            let journal = journal.clone();
            engine.set_order_listener(Arc::new(move |order: &Order| {
                if order.status == OrderStatus::New && order.filled_qty == 0 {
                    if let Err(e) = journal.append(JournalEvent::OrderNew {
                        id: order.id,
                        symbol: order.symbol.clone(),
                        user: order.owner.clone(),
                        side: order.side,
                        order_type: order.order_type,
                        price_micro: order.limit_price,
                        qty: order.original_qty,
                        ts: order.created_at,
                    }) {
                        warn!(error = %e, "journal append failed for order");
                    }
                }
            }));
        }
        let engine = Arc::new(engine);

        let sequencer = {
            let engine = engine.clone();
            let positions = positions.clone();
            let risk = risk.clone();
            let circuit = circuit.clone();
            let catalog = catalog.clone();
            Sequencer::spawn(1024, move |command| {
                dispatch(command, &engine, &positions, &risk, &circuit, &catalog)
            })
        };

        Self {
            catalog,
            rates,
            engine,
            positions,
            risk,
            circuit,
            journal,
            sequencer,
        }
    }

    pub fn submit_order(
        &self,
        symbol: &str,
        user: &str,
        side: Side,
        order_type: OrderType,
        price: Price,
        stop_price: Price,
        quantity: i64,
        client_id: Option<String>,
    ) -> Result<(Order, Vec<Trade>)> {
        let response = self
            .sequencer
            .submit_sync(
                Command::SubmitOrder {
                    symbol: symbol.to_string(),
                    user: user.to_string(),
                    side,
                    order_type,
                    price,
                    stop_price,
                    quantity,
                    client_id,
                },
                SEQUENCER_TIMEOUT,
            )
            .map_err(ExchangeError::from)?;
        match response {
            CommandResponse::OrderAccepted { order, trades } => Ok((order, trades)),
            CommandResponse::Error(e) => Err(e),
            _ => unreachable!("submit_order always yields OrderAccepted or Error"),
        }
    }

    pub fn submit_order_async(
        &self,
        symbol: &str,
        user: &str,
        side: Side,
        order_type: OrderType,
        price: Price,
        stop_price: Price,
        quantity: i64,
        client_id: Option<String>,
    ) -> Result<()> {
        self.sequencer
            .submit_async(Command::SubmitOrder {
                symbol: symbol.to_string(),
                user: user.to_string(),
                side,
                order_type,
                price,
                stop_price,
                quantity,
                client_id,
            })
            .map_err(ExchangeError::from)
    }

    pub fn cancel_order(&self, symbol: &str, order_id: OrderId) -> Result<Order> {
        let response = self
            .sequencer
            .submit_sync(
                Command::CancelOrder {
                    symbol: symbol.to_string(),
                    order_id,
                },
                SEQUENCER_TIMEOUT,
            )
            .map_err(ExchangeError::from)?;
        match response {
            CommandResponse::OrderCancelled { order } => Ok(order),
            CommandResponse::Error(e) => Err(e),
            _ => unreachable!("cancel_order always yields OrderCancelled or Error"),
        }
    }

    pub fn modify_order(
        &self,
        symbol: &str,
        order_id: OrderId,
        new_price: Option<Price>,
        new_quantity: Option<i64>,
    ) -> Result<(Order, Vec<Trade>)> {
        let response = self
            .sequencer
            .submit_sync(
                Command::ModifyOrder {
                    symbol: symbol.to_string(),
                    order_id,
                    new_price,
                    new_quantity,
                },
                SEQUENCER_TIMEOUT,
            )
            .map_err(ExchangeError::from)?;
        match response {
            CommandResponse::OrderModified { order, trades } => Ok((order, trades)),
            CommandResponse::Error(e) => Err(e),
            _ => unreachable!("modify_order always yields OrderModified or Error"),
        }
    }

    pub fn deposit(&self, user: &str, amount: i64) -> Result<Account> {
        let response = self
            .sequencer
            .submit_sync(
                Command::Deposit {
                    user: user.to_string(),
                    amount,
                },
                SEQUENCER_TIMEOUT,
            )
            .map_err(ExchangeError::from)?;
        match response {
            CommandResponse::Account(account) => Ok(account),
            CommandResponse::Error(e) => Err(e),
            _ => unreachable!("deposit always yields Account or Error"),
        }
    }

    pub fn withdraw(&self, user: &str, amount: i64) -> Result<Account> {
        let response = self
            .sequencer
            .submit_sync(
                Command::Withdraw {
                    user: user.to_string(),
                    amount,
                },
                SEQUENCER_TIMEOUT,
            )
            .map_err(ExchangeError::from)?;
        match response {
            CommandResponse::Account(account) => Ok(account),
            CommandResponse::Error(e) => Err(e),
            _ => unreachable!("withdraw always yields Account or Error"),
        }
    }

    pub fn halt_symbol(&self, symbol: &str, duration: Duration) -> Result<()> {
        self.sequencer
            .submit_sync(
                Command::HaltSymbol {
                    symbol: symbol.to_string(),
                    duration_micros: duration.as_micros() as u64,
                },
                SEQUENCER_TIMEOUT,
            )
            .map(|_| ())
            .map_err(ExchangeError::from)
    }

    pub fn resume_market(&self) -> Result<()> {
        self.sequencer
            .submit_sync(Command::ResumeMarket, SEQUENCER_TIMEOUT)
            .map(|_| ())
            .map_err(ExchangeError::from)
    }

    // --- Read-only observers (§4.11: may read without sequencing). ---

    pub fn best_bid_offer(&self, symbol: &str) -> Option<(Option<(Price, i64)>, Option<(Price, i64)>)> {
        self.engine.best_bid_offer(symbol)
    }

    pub fn depth(&self, symbol: &str, side: Side, levels: usize) -> Option<Vec<(Price, i64)>> {
        self.engine.depth(symbol, side, levels)
    }

    pub fn position(&self, user: &str, symbol: &str) -> Position {
        self.positions.position(user, symbol)
    }

    pub fn account(&self, user: &str) -> Account {
        self.positions.account(user)
    }

    pub fn product(&self, symbol: &str) -> Result<crate::catalog::Product> {
        self.catalog.get(symbol)
    }
}

fn dispatch(
    command: Command,
    engine: &Arc<MatchingEngine>,
    positions: &Arc<PositionManager>,
    risk: &Arc<RiskEngine>,
    circuit: &Arc<CircuitBreaker>,
    catalog: &Arc<ProductCatalog>,
) -> CommandResponse {
    match command {
        Command::SubmitOrder {
            symbol,
            user,
            side,
            order_type,
            price,
            stop_price,
            quantity,
            client_id,
        } => {
            let reference_price = catalog.get(&symbol).map(|p| p.mark_price).unwrap_or(0);
            // Market orders carry `price == 0` (book.rs ignores the limit for
            // them); a bare 0 fed into the deviation checks below reads as a
            // 100% move off the reference and halts/rejects every market
            // order. Use the reference price itself as the effective price
            // for these two checks, matching a Market order's intent to
            // trade at whatever the current price is.
            let effective_price = if order_type == OrderType::Market { reference_price } else { price };
            if let Err(e) = circuit.enforce(&symbol, side, effective_price) {
                return CommandResponse::Error(e);
            }
            if let Err(e) = risk.check_order(&user, &symbol, side, effective_price, quantity, reference_price) {
                return CommandResponse::Error(e);
            }
            let now = now_micros();
            let realized_before = positions.account(&user).realized_pnl;
            let order = Order {
                id: next_order_id(),
                symbol,
                owner: user,
                side,
                order_type,
                limit_price: price,
                stop_price,
                original_qty: quantity,
                filled_qty: 0,
                remaining_qty: quantity,
                status: OrderStatus::New,
                reduce_only: false,
                triggered: false,
                created_at: now,
                updated_at: now,
                client_id,
            };
            match engine.submit_order(order) {
                Ok((order, trades)) => {
                    let realized_after = positions.account(&order.owner).realized_pnl;
                    risk.update_position(
                        &order.owner,
                        &order.symbol,
                        signed_quantity(order.side, trades.iter().map(|t| t.quantity).sum()),
                        realized_after - realized_before,
                    );
                    CommandResponse::OrderAccepted { order, trades }
                }
                Err(e) => CommandResponse::Error(e),
            }
        }
        Command::CancelOrder { symbol, order_id } => match engine.cancel_order(&symbol, order_id) {
            Ok(order) => CommandResponse::OrderCancelled { order },
            Err(e) => CommandResponse::Error(e),
        },
        Command::ModifyOrder {
            symbol,
            order_id,
            new_price,
            new_quantity,
        } => match engine.modify_order(&symbol, order_id, new_price, new_quantity) {
            Ok((order, trades)) => CommandResponse::OrderModified { order, trades },
            Err(e) => CommandResponse::Error(e),
        },
        Command::Deposit { user, amount } => match positions.deposit(&user, amount) {
            Ok(account) => CommandResponse::Account(account),
            Err(e) => CommandResponse::Error(e),
        },
        Command::Withdraw { user, amount } => match positions.withdraw(&user, amount) {
            Ok(account) => CommandResponse::Account(account),
            Err(e) => CommandResponse::Error(e),
        },
        Command::AdjustMargin { user, symbol, delta } => {
            risk.update_position(&user, &symbol, 0, delta);
            CommandResponse::Ack
        }
        Command::MarkUpdate { symbol, reference_price } => {
            circuit.set_reference_price(&symbol, reference_price);
            catalog.update_mark(&symbol, reference_price);
            CommandResponse::Ack
        }
        Command::HaltSymbol { symbol, duration_micros } => {
            circuit.halt_symbol(&symbol, duration_micros);
            CommandResponse::Ack
        }
        Command::HaltMarket { .. } => {
            circuit.halt_market();
            CommandResponse::Ack
        }
        Command::ResumeMarket => {
            circuit.resume_market();
            CommandResponse::Ack
        }
        Command::SettleFunding { symbol } => {
            match catalog.get(&symbol) {
                Ok(product) => {
                    positions.settle_funding(&symbol, product.funding_rate, product.mark_price);
                    tracing::trace!(symbol, rate = product.funding_rate, "funding settled");
                }
                Err(e) => {
                    tracing::warn!(symbol, error = %e, "skipped funding settlement for unknown product");
                }
            }
            CommandResponse::Ack
        }
    }
}

fn signed_quantity(side: Side, qty: i64) -> i64 {
    match side {
        Side::Buy => qty,
        Side::Sell => -qty,
    }
}

static NEXT_ORDER_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

fn next_order_id() -> OrderId {
    NEXT_ORDER_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
}
