//! C8 — Margin Calculator (§4.8). Stateless pure functions, grounded on
//! `original_source/src/risk_engine.h`'s `MarginCalculator`; that type's
//! `calc_liquidation_price` only accounts for entry price and the
//! maintenance margin rate, ignoring `available_margin` despite taking
//! it as a parameter — DESIGN.md's Open Question decision generalizes
//! the closed form here to actually use `available`, collapsing back to
//! the original's formula when `available` equals the locked initial
//! margin.

use crate::types::{Price, Side};

/// `notional × initial_rate`.
pub fn initial_margin(qty: i64, price: Price, initial_rate: f64) -> i64 {
    (qty.unsigned_abs() as f64 * price as f64 * initial_rate) as i64
}

/// `|size| × mark × maint_rate`.
pub fn maintenance_margin(size: i64, mark: Price, maint_rate: f64) -> i64 {
    (size.unsigned_abs() as f64 * mark as f64 * maint_rate) as i64
}

/// `equity = available + unrealized`; liquidate when `equity < maint`.
pub fn should_liquidate(size: i64, entry: Price, mark: Price, available: i64, maint_rate: f64) -> bool {
    let unrealized = size as f64 * (mark - entry) as f64;
    let equity = available as f64 + unrealized;
    let maint = maintenance_margin(size, mark, maint_rate);
    equity < maint as f64
}

/// Solves for the mark price at which `equity == maintenance_margin`,
/// i.e. `available + size·(price − entry) == |size|·price·maint_rate`
/// for longs (size > 0), and the mirrored form for shorts. Rearranged:
///
/// `price·(|size| − sign(size)·|size|·maint_rate) == available − sign(size)·|size|·entry`
///
/// which, for a long (`size > 0`), simplifies to
/// `price = (size·entry − available) / (size·(1 − maint_rate))`,
/// and for a short (`size < 0`) to
/// `price = (|size|·entry + available) / (|size|·(1 + maint_rate))`.
pub fn liquidation_price(side: Side, size: i64, entry: Price, available: i64, maint_rate: f64) -> Price {
    let abs_size = size.unsigned_abs() as f64;
    if abs_size == 0.0 {
        return 0;
    }
    let entry = entry as f64;
    let available = available as f64;
    let price = match side {
        Side::Buy => (abs_size * entry - available) / (abs_size * (1.0 - maint_rate)),
        Side::Sell => (abs_size * entry + available) / (abs_size * (1.0 + maint_rate)),
    };
    price.max(0.0) as Price
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_margin_is_notional_times_rate() {
        assert_eq!(initial_margin(10, 100, 0.1), 100);
    }

    #[test]
    fn maintenance_margin_uses_absolute_size() {
        assert_eq!(maintenance_margin(-10, 100, 0.05), 50);
    }

    #[test]
    fn liquidation_triggers_when_equity_drops_below_maintenance() {
        assert!(should_liquidate(10, 100, 50, 50, 0.05));
        assert!(!should_liquidate(10, 100, 100, 1_000, 0.05));
    }

    #[test]
    fn liquidation_price_collapses_to_simple_form_when_available_equals_locked_margin() {
        // available == initial margin locked at entry (10x leverage, 10% initial rate)
        let size = 10;
        let entry = 1_000;
        let available = (size * entry) / 10; // 10% initial margin
        let price = liquidation_price(Side::Buy, size, entry, available, 0.05);
        // equity at that price should equal maintenance margin
        let maint = maintenance_margin(size, price, 0.05);
        let equity = available + size * (price - entry);
        assert!((equity - maint).abs() <= 1);
    }

    #[test]
    fn short_liquidation_price_is_above_entry() {
        let price = liquidation_price(Side::Sell, -10, 1_000, 100, 0.05);
        assert!(price > 1_000);
    }
}
