//! Pre-trade risk engine integration properties: rejections surfaced
//! through the full `ExchangeContext` rather than the bare `RiskEngine`
//! (§4.7, §8).

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

fn build_context(dir: &tempfile::TempDir, risk: Arc<RiskEngine>) -> ExchangeContext {
    let catalog = Arc::new(ProductCatalog::new());
    catalog.register(sample_product("XAU-PERP"));
    let rates = Arc::new(RateProvider::new("CRE_USD_MNT_RATE", 3_450.0));
    let circuit = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
    let journal = Arc::new(FileJournal::open(dir.path().join("journal.bin")).unwrap());
    let ctx = ExchangeContext::new(catalog, rates, risk, circuit, journal, 1024);
    ctx.engine.add_book("XAU-PERP", 1);
    ctx
}

#[test]
fn fat_finger_rejection_surfaces_through_submit_order() {
    let dir = tempfile::tempdir().unwrap();
    let risk = Arc::new(RiskEngine::new(UserRiskLimits {
        fat_finger_threshold: 0.01,
        ..Default::default()
    }));
    let ctx = build_context(&dir, risk);
    ctx.deposit("T", 1_000_000).unwrap();

    // The circuit breaker has no reference price yet for this symbol, so
    // this first order sets one and passes Normal regardless of price;
    // the risk engine's own fat-finger check (against the catalog's
    // pre-registered 3_500 mark) is what should reject it.
    let err = ctx
        .submit_order("XAU-PERP", "T", Side::Buy, OrderType::Limit, 7_000, 0, 1, None)
        .unwrap_err();
    assert!(matches!(err, ExchangeError::FatFingerPrice { .. }));
}

#[test]
fn position_limit_rejection_surfaces_through_submit_order() {
    let dir = tempfile::tempdir().unwrap();
    let risk = Arc::new(RiskEngine::new(UserRiskLimits {
        max_position_notional: 1_000,
        ..Default::default()
    }));
    let ctx = build_context(&dir, risk);
    ctx.deposit("T", 1_000_000).unwrap();

    let err = ctx
        .submit_order("XAU-PERP", "T", Side::Buy, OrderType::Limit, 3_500, 0, 10, None)
        .unwrap_err();
    assert!(matches!(err, ExchangeError::PositionLimitExceeded { .. }));
}

#[test]
fn rate_limit_rejection_surfaces_after_the_configured_burst() {
    let dir = tempfile::tempdir().unwrap();
    let risk = Arc::new(RiskEngine::new(UserRiskLimits {
        max_orders_per_second: 2,
        ..Default::default()
    }));
    let ctx = build_context(&dir, risk);
    ctx.deposit("T", 1_000_000).unwrap();

    ctx.submit_order("XAU-PERP", "T", Side::Buy, OrderType::PostOnly, 3_400, 0, 1, None)
        .unwrap();
    ctx.submit_order("XAU-PERP", "T", Side::Buy, OrderType::PostOnly, 3_399, 0, 1, None)
        .unwrap();
    let err = ctx
        .submit_order("XAU-PERP", "T", Side::Buy, OrderType::PostOnly, 3_398, 0, 1, None)
        .unwrap_err();
    assert!(matches!(err, ExchangeError::RateLimitExceeded { .. }));
}

/// A realized loss large enough to breach the daily loss limit blocks
/// the user's subsequent orders, even on an unrelated symbol-agnostic
/// submit.
#[test]
fn breaching_daily_loss_limit_blocks_further_submits() {
    let dir = tempfile::tempdir().unwrap();
    let risk = Arc::new(RiskEngine::new(UserRiskLimits::default()));
    risk.update_position("T", "XAU-PERP", 0, -2_000_000_000_000);
    let ctx = build_context(&dir, risk);
    ctx.deposit("T", 1_000_000).unwrap();

    let err = ctx
        .submit_order("XAU-PERP", "T", Side::Buy, OrderType::Limit, 3_500, 0, 1, None)
        .unwrap_err();
    assert!(matches!(err, ExchangeError::DailyLossLimit { .. }));
}
