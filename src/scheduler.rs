//! C13 — Scheduler: periodic producers (funding settlement, mark-price
//! refresh) that enqueue commands the same way any other producer does
//! (§4.11, §5). Grounded on `original_source/src/main.cpp`'s periodic
//! background-timer loops for funding/feed refresh, expressed with
//! `tokio::time::interval` per the teacher's async-feature stack rather
//! than the original's raw `std::thread` + `sleep_for`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::circuit::CircuitBreaker;
use crate::catalog::ProductCatalog;
use crate::engine::MatchingEngine;
use crate::markprice::composite_mark;
use crate::rates::RateProvider;
use crate::sequencer::{Command, Sequencer};
use crate::types::Symbol;

/// Periodic background driver. Owns no exclusive state of its own — it
/// only ever enqueues commands into the sequencer or mutates the
/// narrow-mutex components that are safe for any thread to touch
/// directly (§5 Shared resources).
pub struct Scheduler {
    sequencer: Sequencer,
    catalog: Arc<ProductCatalog>,
    rates: Arc<RateProvider>,
    circuit: Arc<CircuitBreaker>,
    engine: Arc<MatchingEngine>,
}

impl Scheduler {
    pub fn new(
        sequencer: Sequencer,
        catalog: Arc<ProductCatalog>,
        rates: Arc<RateProvider>,
        circuit: Arc<CircuitBreaker>,
        engine: Arc<MatchingEngine>,
    ) -> Self {
        Self {
            sequencer,
            catalog,
            rates,
            circuit,
            engine,
        }
    }

    /// Settles funding for every perpetual product on `interval` — an
    /// operator-supplied cadence (DESIGN.md Open Question decision #4;
    /// spec.md does not fix one).
    pub fn spawn_funding_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for product in this.catalog.by_category(crate::catalog::ProductCategory::Perpetual) {
                    if let Err(e) = this.sequencer.submit_async(Command::SettleFunding {
                        symbol: product.symbol.clone(),
                    }) {
                        warn!(symbol = %product.symbol, error = %e, "failed to enqueue funding settlement");
                    }
                }
            }
        })
    }

    /// Refreshes the composite mark price for `symbol` from the most
    /// recently observed external reference rate (§4.10).
    pub fn spawn_mark_price_task(self: &Arc<Self>, symbol: Symbol, reference_pair: String, interval: Duration) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let reference = (this.rates.get_rate(&reference_pair) * 1_000_000.0) as crate::types::Price;
                let Ok(product) = this.catalog.get(&symbol) else {
                    continue;
                };
                let book_mid = this
                    .engine
                    .best_bid_offer(&symbol)
                    .and_then(|(bid, ask)| match (bid, ask) {
                        (Some((bid_px, _)), Some((ask_px, _))) => Some((bid_px + ask_px) / 2),
                        _ => None,
                    })
                    .unwrap_or(0);
                let mark = composite_mark(reference, product.last_price, book_mid);
                this.catalog.update_mark(&symbol, mark);
                this.circuit.set_reference_price(&symbol, reference);
                info!(symbol = %symbol, mark, "mark price refreshed");
            }
        })
    }
}
