//! C1 — Product Catalog: static instrument metadata plus the three fields
//! (mark, last, funding) that mutate on every trade/tick (§4.1).
//!
//! Grounded on `original_source/central_exchange/src/product_catalog.h`'s
//! `Product`/`ProductCategory`/`HedgeMode`, generalized away from the
//! FXCM/MNT-specific naming into the domain-neutral terms spec.md uses.
//! Backed by `DashMap` per the teacher's per-symbol concurrent-map idiom
//! (`orderbook/manager.rs`'s symbol-keyed book table) so that mark/last/
//! funding mutation never needs to route through the sequencer (§5, §9).

use dashmap::DashMap;

use crate::error::{ExchangeError, Result};
use crate::types::{snap_to_tick, Price, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductCategory {
    Spot,
    Perpetual,
    Fx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HedgeMode {
    #[default]
    None,
    Full,
    DeltaNeutral,
}

#[derive(Debug, Clone)]
pub struct Product {
    pub symbol: Symbol,
    pub category: ProductCategory,
    /// External reference instrument used by the Rate Provider / mark
    /// composer, e.g. an index or FX pair this product tracks.
    pub reference_symbol: Option<String>,
    /// Multiplies the reference price when converting into quote currency.
    pub quote_conversion_multiplier: f64,
    /// Whether the conversion above is applied as a division (inverted
    /// cross) rather than a multiplication.
    pub quote_conversion_inverted: bool,
    pub hedge_mode: HedgeMode,
    pub contract_size: i64,
    pub tick_size: Price,
    pub min_order_size: i64,
    pub max_order_size: i64,
    pub initial_margin_rate: f64,
    pub maintenance_margin_rate: f64,
    pub maker_fee_bps: i32,
    pub taker_fee_bps: i32,
    pub spread_markup_bps: i32,
    pub min_notional: i64,
    pub min_fee_floor: i64,
    pub mark_price: Price,
    pub last_price: Price,
    pub funding_rate: f64,
    pub is_active: bool,
}

impl Product {
    pub fn snap_price(&self, price: Price) -> Price {
        snap_to_tick(price, self.tick_size)
    }

    pub fn is_on_tick(&self, price: Price) -> bool {
        self.tick_size <= 0 || price % self.tick_size == 0
    }

    pub fn requires_hedge(&self) -> bool {
        self.hedge_mode != HedgeMode::None && self.reference_symbol.is_some()
    }
}

/// Thread-safe catalog of products, keyed by symbol.
#[derive(Default)]
pub struct ProductCatalog {
    products: DashMap<Symbol, Product>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, product: Product) {
        self.products.insert(product.symbol.clone(), product);
    }

    pub fn get(&self, symbol: &str) -> Result<Product> {
        self.products
            .get(symbol)
            .map(|p| p.clone())
            .ok_or_else(|| ExchangeError::ProductUnknown {
                symbol: symbol.to_string(),
            })
    }

    pub fn require_active(&self, symbol: &str) -> Result<Product> {
        let product = self.get(symbol)?;
        if !product.is_active {
            return Err(ExchangeError::ProductInactive {
                symbol: symbol.to_string(),
            });
        }
        Ok(product)
    }

    pub fn by_category(&self, category: ProductCategory) -> Vec<Product> {
        self.products
            .iter()
            .filter(|e| e.category == category)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn active(&self) -> Vec<Product> {
        self.products
            .iter()
            .filter(|e| e.is_active)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn hedgeable(&self) -> Vec<Product> {
        self.products
            .iter()
            .filter(|e| e.requires_hedge())
            .map(|e| e.value().clone())
            .collect()
    }

    /// Atomically mutate the mark price for `symbol`. No-op if unknown.
    pub fn update_mark(&self, symbol: &str, mark: Price) {
        if let Some(mut p) = self.products.get_mut(symbol) {
            p.mark_price = mark;
        }
    }

    /// Atomically mutate the last-traded price for `symbol`.
    pub fn update_last(&self, symbol: &str, last: Price) {
        if let Some(mut p) = self.products.get_mut(symbol) {
            p.last_price = last;
        }
    }

    /// Atomically mutate the funding rate for `symbol`.
    pub fn update_funding_rate(&self, symbol: &str, rate: f64) {
        if let Some(mut p) = self.products.get_mut(symbol) {
            p.funding_rate = rate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(symbol: &str) -> Product {
        Product {
            symbol: symbol.to_string(),
            category: ProductCategory::Perpetual,
            reference_symbol: Some("XAU/USD".to_string()),
            quote_conversion_multiplier: 1.0,
            quote_conversion_inverted: false,
            hedge_mode: HedgeMode::Full,
            contract_size: 1,
            tick_size: 1_000,
            min_order_size: 1,
            max_order_size: 1_000_000,
            initial_margin_rate: 0.10,
            maintenance_margin_rate: 0.05,
            maker_fee_bps: 2,
            taker_fee_bps: 5,
            spread_markup_bps: 0,
            min_notional: 10_000,
            min_fee_floor: 1,
            mark_price: 3_500_000_000,
            last_price: 3_500_000_000,
            funding_rate: 0.0,
            is_active: true,
        }
    }

    #[test]
    fn lookup_roundtrips() {
        let catalog = ProductCatalog::new();
        catalog.register(sample("XAU-PERP"));
        let p = catalog.get("XAU-PERP").unwrap();
        assert_eq!(p.symbol, "XAU-PERP");
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        let catalog = ProductCatalog::new();
        assert!(matches!(
            catalog.get("NOPE"),
            Err(ExchangeError::ProductUnknown { .. })
        ));
    }

    #[test]
    fn inactive_product_rejected() {
        let catalog = ProductCatalog::new();
        let mut p = sample("OLD-PERP");
        p.is_active = false;
        catalog.register(p);
        assert!(matches!(
            catalog.require_active("OLD-PERP"),
            Err(ExchangeError::ProductInactive { .. })
        ));
    }

    #[test]
    fn mark_update_is_visible_immediately() {
        let catalog = ProductCatalog::new();
        catalog.register(sample("XAU-PERP"));
        catalog.update_mark("XAU-PERP", 3_600_000_000);
        assert_eq!(catalog.get("XAU-PERP").unwrap().mark_price, 3_600_000_000);
    }

    #[test]
    fn hedgeable_filters_on_reference_and_mode() {
        let catalog = ProductCatalog::new();
        catalog.register(sample("XAU-PERP"));
        let mut unhedged = sample("MN-PERP");
        unhedged.hedge_mode = HedgeMode::None;
        unhedged.reference_symbol = None;
        catalog.register(unhedged);
        let hedgeable = catalog.hedgeable();
        assert_eq!(hedgeable.len(), 1);
        assert_eq!(hedgeable[0].symbol, "XAU-PERP");
    }

    #[test]
    fn tick_snap_helper_matches_types_snap() {
        let p = sample("XAU-PERP");
        // tick_size = 1_000; 3_500_600 is 600 past 3_500_000, over half a tick.
        assert_eq!(p.snap_price(3_500_600), 3_501_000);
        // an exact half-tick remainder rounds toward zero.
        assert_eq!(p.snap_price(3_500_500), 3_500_000);
        assert!(p.is_on_tick(3_501_000));
        assert!(!p.is_on_tick(3_500_500));
    }
}
