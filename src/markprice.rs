//! C10 — Mark-Price Composer (§4.10). A pure function, not a stateful
//! component: given the external reference rate plus the book's own
//! last-trade and mid prices, blend them into the mark used for
//! unrealized PnL and liquidation. Grounded on
//! `original_source/forex_service/src/product_catalog.h`'s mark-price
//! blending of external feed vs. last traded price, generalized to also
//! fold in the book mid per spec's three-way weighting.

use crate::types::Price;

/// `0.70·r + 0.20·(l if l>0 else r) + 0.10·(m if m>0 else r)`.
pub fn composite_mark(reference: Price, last_trade: Price, book_mid: Price) -> Price {
    let r = reference as f64;
    let l = if last_trade > 0 { last_trade as f64 } else { r };
    let m = if book_mid > 0 { book_mid as f64 } else { r };
    (0.70 * r + 0.20 * l + 0.10 * m) as Price
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_reference_when_trade_and_mid_are_unavailable() {
        assert_eq!(composite_mark(1_000, 0, 0), 1_000);
    }

    #[test]
    fn blends_all_three_inputs_when_present() {
        let mark = composite_mark(1_000, 1_100, 900);
        assert_eq!(mark, (700.0 + 220.0 + 90.0) as Price);
    }

    #[test]
    fn only_trade_missing_falls_back_to_reference_for_that_term() {
        let mark = composite_mark(1_000, 0, 1_200);
        assert_eq!(mark, (700.0 + 200.0 + 120.0) as Price);
    }
}
