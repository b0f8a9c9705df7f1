//! Circuit breaker integration properties through a full
//! `ExchangeContext`: halts and limit trips observed via `submit_order`
//! rather than the bare `CircuitBreaker::check_order` (§4.9, §8).

use std::sync::Arc;

use exchange_core::prelude::*;

fn sample_product(symbol: &str) -> Product {
    Product {
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
        initial_margin_rate: 0.1,
        maintenance_margin_rate: 0.05,
        maker_fee_bps: 0,
        taker_fee_bps: 0,
        spread_markup_bps: 0,
        min_notional: 1,
        min_fee_floor: 0,
        mark_price: 3_500,
        last_price: 3_500,
        funding_rate: 0.0,
        is_active: true,
    }
}

fn build_context(dir: &tempfile::TempDir) -> ExchangeContext {
    let catalog = Arc::new(ProductCatalog::new());
    catalog.register(sample_product("XAU-PERP"));
    catalog.register(sample_product("BTC-PERP"));
    let rates = Arc::new(RateProvider::new("CRE_USD_MNT_RATE", 3_450.0));
    let risk = Arc::new(RiskEngine::new(UserRiskLimits::default()));
    let circuit = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
    let journal = Arc::new(FileJournal::open(dir.path().join("journal.bin")).unwrap());
    let ctx = ExchangeContext::new(catalog, rates, risk, circuit, journal, 1024);
    ctx.engine.add_book("XAU-PERP", 1);
    ctx.engine.add_book("BTC-PERP", 1);
    ctx
}

/// An order priced far enough from the reference to deviate beyond the
/// halt threshold, but on the side that never trips the direction-specific
/// limit-up/limit-down check, halts the symbol directly (not just on a
/// realized trade) and keeps rejecting later submits on either side.
#[test]
fn an_order_deviating_past_the_halt_threshold_halts_the_symbol_for_later_submits() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = build_context(&dir);
    ctx.deposit("T", 1_000_000).unwrap();
    ctx.circuit.set_reference_price("XAU-PERP", 3_500);

    // 2_975 is 15% below the 3_500 reference: past the 10% halt threshold,
    // but a buy never crosses the buy-side upper limit, so this trips the
    // halt branch rather than `SymbolLimitUp`/`SymbolLimitDown`.
    let err = ctx
        .submit_order("XAU-PERP", "T", Side::Buy, OrderType::Limit, 2_975, 0, 1, None)
        .unwrap_err();
    assert!(matches!(err, ExchangeError::SymbolHalted { .. }));
    assert_eq!(ctx.circuit.state("XAU-PERP"), CircuitState::Halted);

    let err = ctx
        .submit_order("XAU-PERP", "T", Side::Sell, OrderType::Limit, 3_500, 0, 1, None)
        .unwrap_err();
    assert!(matches!(err, ExchangeError::SymbolHalted { .. }));
}

#[test]
fn halted_symbol_auto_resumes_once_the_halt_window_elapses() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = build_context(&dir);
    ctx.deposit("T", 1_000_000).unwrap();
    // A zero-length halt window so it expires immediately on the next check.
    ctx.circuit.halt_symbol("XAU-PERP", 0);
    assert_eq!(ctx.circuit.state("XAU-PERP"), CircuitState::Halted);

    ctx.submit_order("XAU-PERP", "T", Side::Buy, OrderType::Limit, 3_500, 0, 1, None)
        .unwrap();
    assert_eq!(ctx.circuit.state("XAU-PERP"), CircuitState::Normal);
}

#[test]
fn halting_the_whole_market_rejects_every_symbol_until_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = build_context(&dir);
    ctx.deposit("T", 1_000_000).unwrap();

    ctx.circuit.halt_market();
    let err = ctx
        .submit_order("XAU-PERP", "T", Side::Buy, OrderType::Limit, 3_500, 0, 1, None)
        .unwrap_err();
    assert!(matches!(err, ExchangeError::MarketHalted));
    let err = ctx
        .submit_order("BTC-PERP", "T", Side::Buy, OrderType::Limit, 3_500, 0, 1, None)
        .unwrap_err();
    assert!(matches!(err, ExchangeError::MarketHalted), "a market halt is not scoped to one symbol");

    ctx.circuit.resume_market();
    ctx.submit_order("XAU-PERP", "T", Side::Buy, OrderType::Limit, 3_500, 0, 1, None)
        .unwrap();
    ctx.submit_order("BTC-PERP", "T", Side::Buy, OrderType::Limit, 3_500, 0, 1, None)
        .unwrap();
}
