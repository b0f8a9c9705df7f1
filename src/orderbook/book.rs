//! C4 — Order Book: per-symbol price-time-priority book (§4.4).
//!
//! Grounded on `original_source/src/order_book.h` for the two-sorted-maps
//! shape (bids descending, asks ascending) and the teacher's
//! `orderbook/book.rs` for using `crossbeam_skiplist::SkipMap` as the
//! concurrent, already-sorted level map and `dashmap::DashMap` for the
//! id-indexed order lookup. Bids are stored keyed by negated price so a
//! single ascending `SkipMap` serves both sides: `front()` always yields
//! the best price for either side.
//!
//! Mutation only ever happens from the sequencer thread (§5, §9 "no
//! short-circuit"); the skiplist/dashmap choice exists so read-only
//! observers (BBO, depth) can still snapshot-read concurrently without
//! taking the sequencer's place in line.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;

use crate::error::{ExchangeError, Result};
use crate::orderbook::level::PriceLevel;
use crate::orderbook::order::Order;
use crate::types::{snap_to_tick, OrderId, OrderStatus, OrderType, Price, Side, TradeId};
use crate::utils::now_micros;

fn level_key(side: Side, price: Price) -> i64 {
    match side {
        Side::Buy => -price,
        Side::Sell => price,
    }
}

/// A fill produced by the matching loop. Carries no fee information —
/// fees are a Product Catalog concern computed by the Matching Engine
/// (C5) after the book hands back raw fills (§4.6).
#[derive(Debug, Clone)]
pub struct RawFill {
    pub trade_id: TradeId,
    pub maker_order_id: OrderId,
    pub maker_owner: String,
    pub taker_order_id: OrderId,
    pub taker_owner: String,
    pub taker_side: Side,
    pub price: Price,
    pub quantity: i64,
}

#[derive(Debug, Default)]
pub struct SubmitOutcome {
    pub trades: Vec<RawFill>,
    /// Maker orders whose status changed (fill, partial fill, or an STP
    /// cancellation) so the engine can fire order callbacks for them.
    pub updated_makers: Vec<OrderId>,
    /// Maker orders cancelled by self-trade prevention (§4.4): a subset
    /// of `updated_makers`, called out because it's the one
    /// error-taxonomy-visible case (`SelfMatchCancelled`, §7).
    pub self_trade_cancelled: Vec<OrderId>,
}

pub struct OrderBook {
    pub symbol: String,
    tick_size: Price,
    bids: SkipMap<i64, Mutex<PriceLevel>>,
    asks: SkipMap<i64, Mutex<PriceLevel>>,
    orders: DashMap<OrderId, Order>,
    buy_stops: SkipMap<i64, Mutex<Vec<OrderId>>>,
    sell_stops: SkipMap<i64, Mutex<Vec<OrderId>>>,
    next_trade_id: AtomicU64,
    last_trade_price: AtomicI64,
    volume_24h: AtomicI64,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>, tick_size: Price) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size,
            bids: SkipMap::new(),
            asks: SkipMap::new(),
            orders: DashMap::new(),
            buy_stops: SkipMap::new(),
            sell_stops: SkipMap::new(),
            next_trade_id: AtomicU64::new(1),
            last_trade_price: AtomicI64::new(0),
            volume_24h: AtomicI64::new(0),
        }
    }

    pub fn best_bid(&self) -> Option<(Price, i64)> {
        self.bids
            .front()
            .map(|e| (-*e.key(), e.value().lock().unwrap().total_quantity))
    }

    pub fn best_ask(&self) -> Option<(Price, i64)> {
        self.asks
            .front()
            .map(|e| (*e.key(), e.value().lock().unwrap().total_quantity))
    }

    pub fn last_trade_price(&self) -> Price {
        self.last_trade_price.load(Ordering::Acquire)
    }

    pub fn volume_24h(&self) -> i64 {
        self.volume_24h.load(Ordering::Acquire)
    }

    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / 2),
            _ => None,
        }
    }

    /// Depth at up to `levels` price points, best-first.
    pub fn depth(&self, side: Side, levels: usize) -> Vec<(Price, i64)> {
        let map = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        map.iter()
            .take(levels)
            .map(|e| {
                let price = match side {
                    Side::Buy => -*e.key(),
                    Side::Sell => *e.key(),
                };
                (price, e.value().lock().unwrap().total_quantity)
            })
            .collect()
    }

    pub fn get_order(&self, order_id: OrderId) -> Option<Order> {
        self.orders.get(&order_id).map(|o| o.clone())
    }

    fn opposite_map(&self, taker_side: Side) -> &SkipMap<i64, Mutex<PriceLevel>> {
        match taker_side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        }
    }

    fn own_map(&self, side: Side) -> &SkipMap<i64, Mutex<PriceLevel>> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    /// Whether `taker_price` (0 meaning "no limit", i.e. a market order)
    /// still crosses the resting `level_price` on `level`'s side, per the
    /// stop condition in the matching algorithm (§4.4).
    fn crosses(taker_side: Side, taker_price: Price, marketable: bool, level_price: Price) -> bool {
        if marketable {
            return true;
        }
        match taker_side {
            Side::Buy => taker_price >= level_price,
            Side::Sell => taker_price <= level_price,
        }
    }

    /// Read-only walk mirroring `run_match`'s stopping condition, used to
    /// decide FOK/PostOnly admissibility before mutating anything.
    ///
    /// Returns `(fillable_excluding_self, would_trade_with_other_owner)`.
    fn dry_run(&self, taker: &Order) -> (i64, bool) {
        let marketable = matches!(taker.order_type, OrderType::Market);
        let opposite = self.opposite_map(taker.side);
        let mut fillable = 0i64;
        let mut would_trade = false;
        let mut remaining = taker.remaining_qty;
        for entry in opposite.iter() {
            if remaining <= 0 {
                break;
            }
            let level_price = match taker.side {
                Side::Buy => *entry.key(),
                Side::Sell => -*entry.key(),
            };
            if !Self::crosses(taker.side, taker.limit_price, marketable, level_price) {
                break;
            }
            let level = entry.value().lock().unwrap();
            for maker_id in level.order_ids.iter() {
                if remaining <= 0 {
                    break;
                }
                if let Some(maker) = self.orders.get(maker_id) {
                    if maker.owner == taker.owner {
                        continue; // would self-trade-cancel, not fill
                    }
                    let fill = remaining.min(maker.remaining_qty);
                    fillable += fill;
                    remaining -= fill;
                    would_trade = true;
                }
            }
        }
        (fillable, would_trade)
    }

    /// Mutating matching loop (§4.4). Produces trades, applies
    /// self-trade prevention, and updates both sides' resting state.
    fn run_match(&self, taker: &mut Order, now: u64) -> SubmitOutcome {
        let marketable = matches!(taker.order_type, OrderType::Market);
        let mut outcome = SubmitOutcome::default();
        loop {
            if taker.remaining_qty <= 0 {
                break;
            }
            let opposite = self.opposite_map(taker.side);
            let Some(entry) = opposite.front() else {
                break;
            };
            let level_price = match taker.side {
                Side::Buy => *entry.key(),
                Side::Sell => -*entry.key(),
            };
            if !Self::crosses(taker.side, taker.limit_price, marketable, level_price) {
                break;
            }

            let mut drained_maker_ids = Vec::new();
            {
                let mut level = entry.value().lock().unwrap();
                while taker.remaining_qty > 0 {
                    let Some(&maker_id) = level.order_ids.front() else {
                        break;
                    };
                    let mut maker = match self.orders.get_mut(&maker_id) {
                        Some(m) => m,
                        None => {
                            level.order_ids.pop_front();
                            continue;
                        }
                    };

                    if maker.owner == taker.owner {
                        // Self-trade prevention: cancel the resting maker,
                        // produce no trade, keep matching (§4.4).
                        level.order_ids.pop_front();
                        level.total_quantity -= maker.remaining_qty;
                        maker.cancel(now);
                        outcome.updated_makers.push(maker_id);
                        outcome.self_trade_cancelled.push(maker_id);
                        continue;
                    }

                    let fill_qty = taker.remaining_qty.min(maker.remaining_qty);
                    let trade_id = self.next_trade_id.fetch_add(1, Ordering::Relaxed);
                    maker.apply_fill(fill_qty, now);
                    taker.apply_fill(fill_qty, now);
                    level.total_quantity -= fill_qty;

                    outcome.trades.push(RawFill {
                        trade_id,
                        maker_order_id: maker_id,
                        maker_owner: maker.owner.clone(),
                        taker_order_id: taker.id,
                        taker_owner: taker.owner.clone(),
                        taker_side: taker.side,
                        price: level_price,
                        quantity: fill_qty,
                    });
                    outcome.updated_makers.push(maker_id);
                    self.last_trade_price.store(level_price, Ordering::Release);
                    self.volume_24h.fetch_add(fill_qty, Ordering::Relaxed);

                    if maker.remaining_qty == 0 {
                        level.order_ids.pop_front();
                        drained_maker_ids.push(maker_id);
                    }
                }
                if level.is_empty() {
                    drop(level);
                    opposite.remove(entry.key());
                }
            }
            for id in &drained_maker_ids {
                self.orders.remove(id);
            }
        }
        outcome
    }

    fn rest(&self, order: &Order) {
        let key = level_key(order.side, order.limit_price);
        let map = self.own_map(order.side);
        let entry = map.get_or_insert_with(key, || Mutex::new(PriceLevel::new(order.limit_price)));
        entry.value().lock().unwrap().push_back(order.id, order.remaining_qty);
    }

    fn unrest(&self, order: &Order) {
        let key = level_key(order.side, order.limit_price);
        let map = self.own_map(order.side);
        if let Some(entry) = map.get(&key) {
            let mut level = entry.value().lock().unwrap();
            level.remove(order.id, order.remaining_qty);
            let empty = level.is_empty();
            drop(level);
            if empty {
                map.remove(&key);
            }
        }
    }

    fn validate_new(&self, order: &Order) -> Result<()> {
        if order.remaining_qty <= 0 {
            return Err(ExchangeError::QuantityNonPositive {
                quantity: order.remaining_qty,
            });
        }
        if order.order_type != OrderType::Market
            && order.limit_price > 0
            && !self.on_tick(order.limit_price)
        {
            return Err(ExchangeError::PriceOffTick {
                price: order.limit_price,
                tick: self.tick_size,
            });
        }
        Ok(())
    }

    fn on_tick(&self, price: Price) -> bool {
        self.tick_size <= 0 || price % self.tick_size == 0
    }

    /// submit(order) — §4.4. `order` must already have `original_qty`/
    /// `remaining_qty` set to its requested quantity by the caller; this
    /// method performs the tick snap, matching, and post-match placement.
    pub fn submit(&self, mut order: Order) -> Result<(Order, SubmitOutcome)> {
        let now = now_micros();
        if order.limit_price > 0 {
            order.limit_price = snap_to_tick(order.limit_price, self.tick_size);
        }
        self.validate_new(&order)?;

        order.remaining_qty = order.original_qty;
        order.filled_qty = 0;
        order.status = OrderStatus::New;
        order.created_at = now;
        order.updated_at = now;

        if order.order_type == OrderType::StopLimit {
            order.status = OrderStatus::StopPending;
            let key = order.stop_price;
            let stops = match order.side {
                Side::Buy => &self.buy_stops,
                Side::Sell => &self.sell_stops,
            };
            let entry = stops.get_or_insert_with(key, || Mutex::new(Vec::new()));
            entry.value().lock().unwrap().push(order.id);
            self.orders.insert(order.id, order.clone());
            return Ok((order, SubmitOutcome::default()));
        }

        let outcome = match order.order_type {
            OrderType::Fok => {
                let (fillable, _) = self.dry_run(&order);
                if fillable < order.remaining_qty {
                    order.reject(now);
                    return Ok((order, SubmitOutcome::default()));
                }
                self.run_match(&mut order, now)
            }
            OrderType::PostOnly => {
                let (_, would_trade) = self.dry_run(&order);
                if would_trade {
                    order.reject(now);
                    return Ok((order, SubmitOutcome::default()));
                }
                self.run_match(&mut order, now)
            }
            OrderType::Limit | OrderType::Market | OrderType::Ioc => self.run_match(&mut order, now),
            OrderType::StopLimit => unreachable!("handled above"),
        };

        match order.order_type {
            OrderType::Market | OrderType::Ioc => {
                if order.remaining_qty > 0 {
                    order.cancel(now);
                }
            }
            OrderType::Limit | OrderType::PostOnly => {
                if order.remaining_qty > 0 {
                    self.orders.insert(order.id, order.clone());
                    self.rest(&order);
                }
            }
            OrderType::Fok | OrderType::StopLimit => {}
        }

        Ok((order, outcome))
    }

    /// cancel(order_id) — §4.4.
    pub fn cancel(&self, order_id: OrderId) -> Result<Order> {
        let mut entry = self
            .orders
            .get_mut(&order_id)
            .ok_or(ExchangeError::OrderNotFound { order_id })?;
        if !entry.status.is_active() {
            return Err(ExchangeError::OrderNotFound { order_id });
        }
        let now = now_micros();
        entry.cancel(now);
        let snapshot = entry.clone();
        drop(entry);
        self.unrest(&snapshot);
        Ok(snapshot)
    }

    /// modify(order_id, new_price?, new_quantity?) — §4.4.
    pub fn modify(
        &self,
        order_id: OrderId,
        new_price: Option<Price>,
        new_quantity: Option<i64>,
    ) -> Result<(Order, SubmitOutcome)> {
        let current = self
            .orders
            .get(&order_id)
            .map(|o| o.clone())
            .ok_or(ExchangeError::OrderNotFound { order_id })?;
        if !current.status.is_active() {
            return Err(ExchangeError::OrderNotFound { order_id });
        }
        if let Some(q) = new_quantity {
            if q < current.filled_qty {
                return Err(ExchangeError::OrderNotModifiable {
                    order_id,
                    reason: "new quantity below filled quantity",
                });
            }
        }

        let price_changes = new_price
            .map(|p| snap_to_tick(p, self.tick_size) != current.limit_price)
            .unwrap_or(false);
        let quantity_increases = new_quantity
            .map(|q| q > current.original_qty)
            .unwrap_or(false);

        if price_changes || quantity_increases {
            // cancel-and-resubmit, losing time priority (§4.4).
            self.cancel(order_id)?;
            let mut resubmitted = current.clone();
            resubmitted.limit_price = new_price
                .map(|p| snap_to_tick(p, self.tick_size))
                .unwrap_or(current.limit_price);
            resubmitted.original_qty = new_quantity.unwrap_or(current.original_qty);
            return self.submit(resubmitted);
        }

        if let Some(q) = new_quantity {
            if q < current.original_qty {
                // in-place shrink, priority preserved.
                let now = now_micros();
                let delta = current.remaining_qty - (q - current.filled_qty);
                let mut entry = self.orders.get_mut(&order_id).unwrap();
                entry.original_qty = q;
                entry.remaining_qty = q - entry.filled_qty;
                entry.updated_at = now;
                let snapshot = entry.clone();
                drop(entry);
                let key = level_key(snapshot.side, snapshot.limit_price);
                if let Some(level_entry) = self.own_map(snapshot.side).get(&key) {
                    level_entry.value().lock().unwrap().total_quantity -= delta;
                }
                return Ok((snapshot, SubmitOutcome::default()));
            }
        }

        Ok((current, SubmitOutcome::default()))
    }

    /// check_stop_orders(trade_price) — §4.4. Called by the Matching
    /// Engine after every produced trade.
    pub fn check_stop_orders(&self, trade_price: Price) -> Vec<(Order, SubmitOutcome)> {
        let mut triggered_ids = Vec::new();

        for entry in self.buy_stops.iter() {
            if *entry.key() > trade_price {
                break;
            }
            let mut ids = entry.value().lock().unwrap();
            triggered_ids.append(&mut ids);
        }
        self.buy_stops
            .iter()
            .filter(|e| e.value().lock().unwrap().is_empty())
            .map(|e| *e.key())
            .collect::<Vec<_>>()
            .into_iter()
            .for_each(|k| {
                self.buy_stops.remove(&k);
            });

        for entry in self.sell_stops.iter() {
            if *entry.key() < trade_price {
                continue;
            }
            let mut ids = entry.value().lock().unwrap();
            triggered_ids.append(&mut ids);
        }
        self.sell_stops
            .iter()
            .filter(|e| e.value().lock().unwrap().is_empty())
            .map(|e| *e.key())
            .collect::<Vec<_>>()
            .into_iter()
            .for_each(|k| {
                self.sell_stops.remove(&k);
            });

        let mut results = Vec::new();
        for id in triggered_ids {
            if let Some((_, mut order)) = self.orders.remove(&id) {
                order.triggered = true;
                order.order_type = OrderType::Limit;
                if let Ok(result) = self.submit(order) {
                    results.push(result);
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: OrderId, owner: &str, side: Side, ty: OrderType, price: Price, qty: i64) -> Order {
        Order {
            id,
            symbol: "XAU-PERP".to_string(),
            owner: owner.to_string(),
            side,
            order_type: ty,
            limit_price: price,
            stop_price: 0,
            original_qty: qty,
            filled_qty: 0,
            remaining_qty: qty,
            status: OrderStatus::New,
            reduce_only: false,
            triggered: false,
            created_at: 0,
            updated_at: 0,
            client_id: None,
        }
    }

    #[test]
    fn exact_match() {
        let book = OrderBook::new("XAU-PERP", 1);
        book.submit(order(1, "M", Side::Sell, OrderType::Limit, 3500, 1))
            .unwrap();
        let (taker, outcome) = book
            .submit(order(2, "T", Side::Buy, OrderType::Limit, 3500, 1))
            .unwrap();
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].price, 3500);
        assert_eq!(outcome.trades[0].quantity, 1);
        assert_eq!(taker.status, OrderStatus::Filled);
        assert!(book.best_bid().is_none());
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn crosses_with_price_improvement() {
        let book = OrderBook::new("XAU-PERP", 1);
        book.submit(order(1, "M", Side::Sell, OrderType::Limit, 3500, 1))
            .unwrap();
        let (_, outcome) = book
            .submit(order(2, "T", Side::Buy, OrderType::Limit, 3600, 1))
            .unwrap();
        assert_eq!(outcome.trades[0].price, 3500);
    }

    #[test]
    fn sweep_multiple_levels_in_price_order() {
        let book = OrderBook::new("XAU-PERP", 1);
        book.submit(order(1, "M1", Side::Sell, OrderType::Limit, 3500, 1))
            .unwrap();
        book.submit(order(2, "M2", Side::Sell, OrderType::Limit, 3600, 1))
            .unwrap();
        book.submit(order(3, "M3", Side::Sell, OrderType::Limit, 3700, 1))
            .unwrap();
        let (_, outcome) = book
            .submit(order(4, "T", Side::Buy, OrderType::Limit, 3600, 2))
            .unwrap();
        assert_eq!(outcome.trades.len(), 2);
        assert_eq!(outcome.trades[0].price, 3500);
        assert_eq!(outcome.trades[1].price, 3600);
        assert_eq!(book.best_ask(), Some((3700, 1)));
    }

    #[test]
    fn fok_unfillable_rolls_back_atomically() {
        let book = OrderBook::new("XAU-PERP", 1);
        book.submit(order(1, "M", Side::Sell, OrderType::Limit, 3500, 1))
            .unwrap();
        let (taker, outcome) = book
            .submit(order(2, "T", Side::Buy, OrderType::Fok, 3500, 5))
            .unwrap();
        assert!(outcome.trades.is_empty());
        assert_eq!(taker.status, OrderStatus::Rejected);
        assert_eq!(book.best_ask(), Some((3500, 1)));
    }

    #[test]
    fn post_only_that_would_cross_is_rejected() {
        let book = OrderBook::new("XAU-PERP", 1);
        book.submit(order(1, "M", Side::Sell, OrderType::Limit, 3500, 1))
            .unwrap();
        let (taker, outcome) = book
            .submit(order(2, "T", Side::Buy, OrderType::PostOnly, 3500, 1))
            .unwrap();
        assert!(outcome.trades.is_empty());
        assert_eq!(taker.status, OrderStatus::Rejected);
        assert_eq!(book.best_ask(), Some((3500, 1)));
    }

    #[test]
    fn self_match_prevention_cancels_resting_order_with_no_trade() {
        let book = OrderBook::new("XAU-PERP", 1);
        book.submit(order(1, "U", Side::Sell, OrderType::Limit, 3500, 1))
            .unwrap();
        let (_, outcome) = book
            .submit(order(2, "U", Side::Buy, OrderType::Limit, 3500, 1))
            .unwrap();
        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.self_trade_cancelled, vec![1]);
        assert!(book.best_ask().is_none());
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn stop_limit_triggers_on_matching_trade_price() {
        let book = OrderBook::new("XAU-PERP", 1);
        book.submit(order(1, "S", Side::Sell, OrderType::Limit, 3510, 2))
            .unwrap();
        let mut stop = order(2, "B", Side::Buy, OrderType::StopLimit, 3515, 1);
        stop.stop_price = 3510;
        let (resting, _) = book.submit(stop).unwrap();
        assert_eq!(resting.status, OrderStatus::StopPending);
        assert_eq!(book.best_ask(), Some((3510, 2)));

        let results = book.check_stop_orders(3510);
        assert_eq!(results.len(), 1);
        let (triggered, outcome) = &results[0];
        assert!(triggered.triggered);
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].quantity, 1);
        assert_eq!(outcome.trades[0].maker_order_id, 1);
    }

    #[test]
    fn cancel_restores_book_to_prior_state() {
        let book = OrderBook::new("XAU-PERP", 1);
        book.submit(order(1, "M", Side::Sell, OrderType::Limit, 3500, 1))
            .unwrap();
        assert_eq!(book.best_ask(), Some((3500, 1)));
        book.cancel(1).unwrap();
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn cancel_unknown_order_is_not_found() {
        let book = OrderBook::new("XAU-PERP", 1);
        assert!(matches!(
            book.cancel(999),
            Err(ExchangeError::OrderNotFound { .. })
        ));
    }

    #[test]
    fn price_off_tick_is_rejected_before_mutation() {
        let book = OrderBook::new("XAU-PERP", 100);
        let err = book
            .submit(order(1, "M", Side::Sell, OrderType::Limit, 3550, 1))
            .unwrap_err();
        assert!(matches!(err, ExchangeError::PriceOffTick { .. }));
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn modify_shrink_preserves_time_priority() {
        let book = OrderBook::new("XAU-PERP", 1);
        book.submit(order(1, "M", Side::Sell, OrderType::Limit, 3500, 10))
            .unwrap();
        let (modified, _) = book.modify(1, None, Some(5)).unwrap();
        assert_eq!(modified.remaining_qty, 5);
        assert_eq!(book.best_ask(), Some((3500, 5)));
    }

    #[test]
    fn modify_price_change_loses_time_priority() {
        let book = OrderBook::new("XAU-PERP", 1);
        book.submit(order(1, "M1", Side::Sell, OrderType::Limit, 3500, 1))
            .unwrap();
        book.submit(order(2, "M2", Side::Sell, OrderType::Limit, 3500, 1))
            .unwrap();
        // M1 moves its price away and back; a taker should now match M2 first.
        book.modify(1, Some(3501), None).unwrap();
        book.modify(1, Some(3500), None).unwrap();
        let (_, outcome) = book
            .submit(order(3, "T", Side::Buy, OrderType::Limit, 3500, 1))
            .unwrap();
        assert_eq!(outcome.trades[0].maker_order_id, 2);
    }
}
