//! C6 — Position Manager: accounts, positions, and the insurance fund
//! (§4.6). Grounded on `original_source/central_exchange/src/
//! accounting_engine.h`'s "hot path: in-memory balance checks via
//! PositionManager" description, expressed the teacher's way: a
//! `DashMap`-backed owner rather than the C++ header's planned
//! dual-speed SQLite/ledger-CLI split (which this crate's Event
//! Journal already covers for the cold path, per DESIGN.md).

pub mod account;
pub mod position;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{trace, warn};

use crate::catalog::ProductCatalog;
use crate::error::{ExchangeError, Result};
use crate::journal::{FileJournal, Journal, JournalEvent};
use crate::orderbook::trade::Trade;
use crate::types::{Price, Side};
use crate::utils::now_micros;

pub use account::Account;
pub use position::Position;

fn position_key(user: &str, symbol: &str) -> (String, String) {
    (user.to_string(), symbol.to_string())
}

/// Shared loss-absorption pool drawn on during liquidation shortfalls
/// (§4.6, §7).
pub struct InsuranceFund {
    balance: AtomicI64,
}

impl InsuranceFund {
    pub fn new(initial_balance: i64) -> Self {
        Self {
            balance: AtomicI64::new(initial_balance),
        }
    }

    pub fn balance(&self) -> i64 {
        self.balance.load(Ordering::SeqCst)
    }

    pub fn contribute(&self, amount: i64) -> i64 {
        self.balance.fetch_add(amount, Ordering::SeqCst) + amount
    }

    /// Draws up to `amount`; returns how much was actually drawn (may be
    /// less than requested if the fund itself is insufficient — §7
    /// shortfalls are recorded, not hidden).
    pub fn draw(&self, amount: i64) -> i64 {
        loop {
            let current = self.balance.load(Ordering::SeqCst);
            let draw = amount.min(current.max(0));
            if self
                .balance
                .compare_exchange(current, current - draw, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return draw;
            }
        }
    }
}

pub struct PositionManager {
    accounts: DashMap<String, Account>,
    positions: DashMap<(String, String), Position>,
    pub insurance_fund: InsuranceFund,
    catalog: Arc<ProductCatalog>,
    journal: Option<Arc<FileJournal>>,
}

impl PositionManager {
    pub fn new(catalog: Arc<ProductCatalog>) -> Self {
        Self {
            accounts: DashMap::new(),
            positions: DashMap::new(),
            insurance_fund: InsuranceFund::new(0),
            catalog,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Arc<FileJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    fn log_event(&self, event: JournalEvent) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(event) {
                warn!(error = %e, "journal append failed");
            }
        }
    }

    pub fn account(&self, user: &str) -> Account {
        self.accounts
            .entry(user.to_string())
            .or_insert_with(|| Account::new(user))
            .clone()
    }

    pub fn position(&self, user: &str, symbol: &str) -> Position {
        self.positions
            .entry(position_key(user, symbol))
            .or_insert_with(|| Position::flat(user, symbol))
            .clone()
    }

    pub fn deposit(&self, user: &str, amount: i64) -> Result<Account> {
        if amount <= 0 {
            return Err(ExchangeError::QuantityNonPositive { quantity: amount });
        }
        let mut entry = self
            .accounts
            .entry(user.to_string())
            .or_insert_with(|| Account::new(user));
        entry.available += amount;
        let snapshot = entry.clone();
        drop(entry);
        self.log_event(JournalEvent::Deposit {
            user: user.to_string(),
            currency: "USD".to_string(),
            amount,
            ts: now_micros(),
        });
        Ok(snapshot)
    }

    pub fn withdraw(&self, user: &str, amount: i64) -> Result<Account> {
        if amount <= 0 {
            return Err(ExchangeError::QuantityNonPositive { quantity: amount });
        }
        let mut entry = self
            .accounts
            .entry(user.to_string())
            .or_insert_with(|| Account::new(user));
        if amount > entry.available {
            return Err(ExchangeError::InsufficientFunds {
                requested: amount,
                available: entry.available,
            });
        }
        entry.available -= amount;
        let snapshot = entry.clone();
        drop(entry);
        self.log_event(JournalEvent::Withdrawal {
            user: user.to_string(),
            currency: "USD".to_string(),
            amount,
            ts: now_micros(),
        });
        Ok(snapshot)
    }

    pub fn check_margin(&self, user: &str, symbol: &str, qty: i64, price: Price) -> bool {
        let rate = self
            .catalog
            .get(symbol)
            .map(|p| p.initial_margin_rate)
            .unwrap_or(1.0);
        let required = (qty as f64 * price as f64 * rate) as i64;
        self.account(user).available >= required
    }

    /// §4.6 `apply_trade`: updates one side of a trade (the side
    /// identified by `is_taker_for_user`). Fees are not recomputed here —
    /// the Matching Engine (C5) already priced `trade.maker_fee`/
    /// `trade.taker_fee` against the product's fee schedule; this method
    /// only debits the side's account by the fee already assigned to it.
    pub fn apply_trade(&self, trade: &Trade, user: &str, is_taker_for_user: bool) {
        let side = if is_taker_for_user {
            trade.taker_side
        } else {
            trade.taker_side.opposite()
        };
        let signed_delta = match side {
            Side::Buy => trade.quantity,
            Side::Sell => -trade.quantity,
        };
        let fee = if is_taker_for_user {
            trade.taker_fee
        } else {
            trade.maker_fee
        };
        let rate = self
            .catalog
            .get(&trade.symbol)
            .map(|p| p.initial_margin_rate)
            .unwrap_or(0.0);

        let mut pos = self
            .positions
            .entry(position_key(user, &trade.symbol))
            .or_insert_with(|| Position::flat(user, &trade.symbol));
        let before_margin = pos.locked_margin;
        let before_realized = pos.realized_pnl;

        let same_sign = pos.size == 0 || (pos.size > 0) == (signed_delta > 0);
        if same_sign {
            let added_notional = signed_delta.unsigned_abs() as i64 * trade.price;
            pos.locked_margin += (added_notional as f64 * rate) as i64;
            let abs_size = pos.size.unsigned_abs() as i64;
            let abs_delta = signed_delta.unsigned_abs() as i64;
            pos.avg_entry_price = if abs_size + abs_delta > 0 {
                (abs_size * pos.avg_entry_price + abs_delta * trade.price) / (abs_size + abs_delta)
            } else {
                0
            };
            pos.size += signed_delta;
        } else {
            let abs_current = pos.size.unsigned_abs() as i64;
            let abs_delta = signed_delta.unsigned_abs() as i64;
            let reduced_qty = abs_current.min(abs_delta);
            let pnl_per_unit = if pos.size > 0 {
                trade.price - pos.avg_entry_price
            } else {
                pos.avg_entry_price - trade.price
            };
            pos.realized_pnl += pnl_per_unit * reduced_qty;
            if abs_current > 0 {
                pos.locked_margin -= pos.locked_margin * reduced_qty / abs_current;
            }
            pos.size += if pos.size > 0 { -reduced_qty } else { reduced_qty };

            if pos.size == 0 {
                pos.avg_entry_price = 0;
                pos.locked_margin = 0;
            }

            // Flip through zero: remainder opens a new position in the
            // taker's direction at the trade price.
            if abs_delta > abs_current {
                let remainder = abs_delta - abs_current;
                let opening_delta = if signed_delta > 0 { remainder } else { -remainder };
                pos.locked_margin = ((remainder * trade.price) as f64 * rate) as i64;
                pos.avg_entry_price = trade.price;
                pos.size = opening_delta;
            }
        }

        let after_margin = pos.locked_margin;
        let realized_delta = pos.realized_pnl - before_realized;
        drop(pos);

        let mut account = self
            .accounts
            .entry(user.to_string())
            .or_insert_with(|| Account::new(user));
        account.available -= fee;
        account.realized_pnl += realized_delta;
        let balance_after = account.available;
        drop(account);

        self.log_event(JournalEvent::FeeCollection {
            user: user.to_string(),
            symbol: trade.symbol.clone(),
            amount: fee,
            fee_type: if is_taker_for_user { "taker" } else { "maker" }.to_string(),
            ts: now_micros(),
        });

        if after_margin != before_margin {
            let delta = after_margin - before_margin;
            if delta > 0 {
                self.log_event(JournalEvent::MarginLock {
                    user: user.to_string(),
                    symbol: trade.symbol.clone(),
                    amount: delta,
                    balance_after,
                    ts: now_micros(),
                });
            } else {
                self.log_event(JournalEvent::MarginRelease {
                    user: user.to_string(),
                    symbol: trade.symbol.clone(),
                    amount: -delta,
                    balance_after,
                    ts: now_micros(),
                });
            }
        }
        trace!(user, symbol = %trade.symbol, "position updated");
    }

    /// Settles funding for every open position in `symbol` at `rate`
    /// against `mark_price` (§4.6/§6 `FundingPayment`). A positive `rate`
    /// debits longs and credits shorts; the per-position payment is the
    /// signed notional times the rate, so the sign of `size` alone
    /// decides who pays.
    pub fn settle_funding(&self, symbol: &str, rate: f64, mark_price: Price) {
        let keys: Vec<(String, String)> = self
            .positions
            .iter()
            .filter(|e| e.symbol == symbol && !e.is_flat())
            .map(|e| e.key().clone())
            .collect();

        for key in keys {
            let Some(pos) = self.positions.get(&key) else {
                continue;
            };
            let size = pos.size;
            let user = pos.user.clone();
            drop(pos);

            let payment = ((size * mark_price) as f64 * rate) as i64;
            if payment == 0 {
                continue;
            }

            let mut account = self
                .accounts
                .entry(user.clone())
                .or_insert_with(|| Account::new(&user));
            account.available -= payment;
            account.realized_pnl -= payment;
            drop(account);

            self.log_event(JournalEvent::FundingPayment {
                user,
                symbol: symbol.to_string(),
                size,
                rate,
                payment,
                ts: now_micros(),
            });
        }
    }

    pub fn update_all_unrealized(&self, mark_prices: &std::collections::HashMap<String, Price>) {
        for mut entry in self.positions.iter_mut() {
            if entry.is_flat() {
                continue;
            }
            if let Some(mark) = mark_prices.get(&entry.symbol) {
                entry.unrealized_pnl = entry.unrealized_at(*mark);
            }
        }
    }

    /// Force-closes a position at `mark_price`, drawing any shortfall
    /// from the insurance fund (§4.6).
    pub fn liquidate(&self, user: &str, symbol: &str, mark_price: Price) -> Result<i64> {
        let mut pos = self
            .positions
            .get_mut(&position_key(user, symbol))
            .ok_or_else(|| ExchangeError::OrderNotFound { order_id: 0 })?;
        if pos.is_flat() {
            return Ok(0);
        }
        let pnl = pos.unrealized_at(mark_price);
        let released_margin = pos.locked_margin;
        let size = pos.size;
        pos.realized_pnl += pnl;
        pos.size = 0;
        pos.avg_entry_price = 0;
        pos.locked_margin = 0;
        pos.unrealized_pnl = 0;
        drop(pos);

        let mut account = self
            .accounts
            .entry(user.to_string())
            .or_insert_with(|| Account::new(user));
        let settled = released_margin + pnl;
        let insurance_draw = if settled < 0 {
            self.insurance_fund.draw(-settled)
        } else {
            0
        };
        account.available += settled + insurance_draw;
        account.available = account.available.max(0);
        drop(account);

        self.log_event(JournalEvent::Liquidation {
            user: user.to_string(),
            symbol: symbol.to_string(),
            size,
            mark: mark_price,
            pnl,
            insurance_draw,
            ts: now_micros(),
        });
        Ok(insurance_draw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{HedgeMode, Product, ProductCategory};
    use crate::types::OrderId;

    fn catalog_with(symbol: &str, margin_rate: f64) -> Arc<ProductCatalog> {
        let catalog = Arc::new(ProductCatalog::new());
        catalog.register(Product {
            symbol: symbol.to_string(),
            category: ProductCategory::Perpetual,
            reference_symbol: None,
            quote_conversion_multiplier: 1.0,
            quote_conversion_inverted: false,
            hedge_mode: HedgeMode::None,
            contract_size: 1,
            tick_size: 1,
            min_order_size: 1,
            max_order_size: 1_000_000,
            initial_margin_rate: margin_rate,
            maintenance_margin_rate: margin_rate / 2.0,
            maker_fee_bps: 0,
            taker_fee_bps: 0,
            spread_markup_bps: 0,
            min_notional: 1,
            min_fee_floor: 0,
            mark_price: 100,
            last_price: 100,
            funding_rate: 0.0,
            is_active: true,
        });
        catalog
    }

    fn sample_trade(price: Price, qty: i64, taker_side: Side) -> Trade {
        Trade {
            id: 1,
            symbol: "XAU-PERP".to_string(),
            maker_order_id: 1 as OrderId,
            maker_owner: "maker".to_string(),
            taker_order_id: 2 as OrderId,
            taker_owner: "taker".to_string(),
            taker_side,
            price,
            quantity: qty,
            maker_fee: 0,
            taker_fee: 0,
            timestamp: 0,
        }
    }

    #[test]
    fn deposit_and_withdraw_update_available() {
        let pm = PositionManager::new(catalog_with("XAU-PERP", 0.1));
        pm.deposit("u1", 1_000).unwrap();
        assert_eq!(pm.account("u1").available, 1_000);
        pm.withdraw("u1", 400).unwrap();
        assert_eq!(pm.account("u1").available, 600);
        assert!(matches!(
            pm.withdraw("u1", 1_000).unwrap_err(),
            ExchangeError::InsufficientFunds { .. }
        ));
    }

    #[test]
    fn opening_a_long_locks_margin_and_sets_avg() {
        let pm = PositionManager::new(catalog_with("XAU-PERP", 0.1));
        let trade = sample_trade(100, 10, Side::Buy);
        pm.apply_trade(&trade, "taker", true);
        let pos = pm.position("taker", "XAU-PERP");
        assert_eq!(pos.size, 10);
        assert_eq!(pos.avg_entry_price, 100);
        assert_eq!(pos.locked_margin, 100); // 10*100*0.1
    }

    #[test]
    fn reducing_a_long_realizes_pnl_and_releases_margin() {
        let pm = PositionManager::new(catalog_with("XAU-PERP", 0.1));
        pm.apply_trade(&sample_trade(100, 10, Side::Buy), "taker", true);
        pm.apply_trade(&sample_trade(110, 4, Side::Sell), "taker", true);
        let pos = pm.position("taker", "XAU-PERP");
        assert_eq!(pos.size, 6);
        assert_eq!(pos.realized_pnl, 40); // (110-100)*4
        assert_eq!(pos.locked_margin, 60); // 100 - 100*4/10
    }

    #[test]
    fn flipping_through_zero_opens_opposite_position() {
        let pm = PositionManager::new(catalog_with("XAU-PERP", 0.1));
        pm.apply_trade(&sample_trade(100, 5, Side::Buy), "taker", true);
        pm.apply_trade(&sample_trade(120, 8, Side::Sell), "taker", true);
        let pos = pm.position("taker", "XAU-PERP");
        assert_eq!(pos.size, -3);
        assert_eq!(pos.avg_entry_price, 120);
    }

    #[test]
    fn liquidation_draws_insurance_fund_on_shortfall() {
        let pm = PositionManager::new(catalog_with("XAU-PERP", 0.1));
        pm.insurance_fund.contribute(1_000);
        pm.apply_trade(&sample_trade(100, 10, Side::Buy), "taker", true);
        // Force a large unrealized loss by liquidating far below entry.
        let draw = pm.liquidate("taker", "XAU-PERP", 50).unwrap();
        assert!(draw > 0);
        assert!(pm.account("taker").available >= 0);
    }
}
