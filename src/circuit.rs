//! C9 — Circuit Breaker (§4.9). Grounded on
//! `original_source/src/circuit_breaker.h`'s `CircuitBreakerManager`,
//! with the `std::unordered_map<std::string, SymbolCircuitState>` +
//! mutex singleton replaced by this crate's usual `DashMap`-per-key
//! idiom; halt/resume callbacks from the original are not carried over
//! since this crate's order/trade callbacks (§4.5) already give callers
//! a way to observe rejections.

use dashmap::DashMap;
use tracing::info;

use crate::error::ExchangeError;
use crate::types::{Price, Side, Symbol};
use crate::utils::now_micros;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Normal,
    LimitUp,
    LimitDown,
    Halted,
    Auction,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub price_limit: f64,
    pub halt_threshold: f64,
    pub time_window_micros: u64,
    pub halt_duration_micros: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            price_limit: 0.05,
            halt_threshold: 0.10,
            time_window_micros: 300_000_000,
            halt_duration_micros: 300_000_000,
        }
    }
}

#[derive(Debug, Clone)]
struct SymbolCircuitState {
    state: CircuitState,
    reference_price: Price,
    upper_limit: Price,
    lower_limit: Price,
    window_start: u64,
    halt_end: u64,
    trigger_count: u64,
}

impl SymbolCircuitState {
    fn new(now: u64) -> Self {
        Self {
            state: CircuitState::Normal,
            reference_price: 0,
            upper_limit: 0,
            lower_limit: 0,
            window_start: now,
            halt_end: 0,
            trigger_count: 0,
        }
    }
}

pub struct CircuitBreaker {
    default_config: CircuitBreakerConfig,
    configs: DashMap<Symbol, CircuitBreakerConfig>,
    states: DashMap<Symbol, SymbolCircuitState>,
    market_halted: std::sync::atomic::AtomicBool,
}

impl CircuitBreaker {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            configs: DashMap::new(),
            states: DashMap::new(),
            market_halted: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn configure(&self, symbol: &str, config: CircuitBreakerConfig) {
        self.configs.insert(symbol.to_string(), config);
    }

    fn config_for(&self, symbol: &str) -> CircuitBreakerConfig {
        self.configs
            .get(symbol)
            .map(|c| c.clone())
            .unwrap_or_else(|| self.default_config.clone())
    }

    pub fn set_reference_price(&self, symbol: &str, price: Price) {
        let config = self.config_for(symbol);
        let now = now_micros();
        let mut state = self
            .states
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolCircuitState::new(now));
        state.reference_price = price;
        state.window_start = now;
        state.upper_limit = (price as f64 * (1.0 + config.price_limit)) as Price;
        state.lower_limit = (price as f64 * (1.0 - config.price_limit)) as Price;
        info!(symbol, price, upper = state.upper_limit, lower = state.lower_limit, "circuit breaker reference set");
    }

    pub fn check_order(&self, symbol: &str, side: Side, price: Price) -> CircuitState {
        if self.market_halted.load(std::sync::atomic::Ordering::SeqCst) {
            return CircuitState::Halted;
        }

        let config = self.config_for(symbol);
        let now = now_micros();
        let mut state = self
            .states
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolCircuitState::new(now));

        if state.state == CircuitState::Halted {
            if now >= state.halt_end {
                state.state = CircuitState::Normal;
                state.reference_price = 0;
                state.window_start = now;
            } else {
                return CircuitState::Halted;
            }
        }

        if state.reference_price == 0 {
            drop(state);
            self.set_reference_price(symbol, price);
            return CircuitState::Normal;
        }

        if now.saturating_sub(state.window_start) > config.time_window_micros {
            state.window_start = now;
        }

        if price >= state.upper_limit && side == Side::Buy {
            state.state = CircuitState::LimitUp;
            state.trigger_count += 1;
            return CircuitState::LimitUp;
        }
        if price <= state.lower_limit && side == Side::Sell {
            state.state = CircuitState::LimitDown;
            state.trigger_count += 1;
            return CircuitState::LimitDown;
        }

        let deviation = (price - state.reference_price).unsigned_abs() as f64 / state.reference_price as f64;
        if deviation >= config.halt_threshold {
            state.state = CircuitState::Halted;
            state.halt_end = now + config.halt_duration_micros;
            state.trigger_count += 1;
            info!(symbol, price, "circuit breaker halted symbol");
            return CircuitState::Halted;
        }

        CircuitState::Normal
    }

    /// §4.9: a trade-price check, independent of order side, that may
    /// trigger a halt but never a limit-up/down state.
    pub fn on_trade(&self, symbol: &str, price: Price) {
        let config = self.config_for(symbol);
        let now = now_micros();
        let mut state = self
            .states
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolCircuitState::new(now));

        if state.reference_price == 0 {
            drop(state);
            self.set_reference_price(symbol, price);
            return;
        }

        let deviation = (price - state.reference_price).unsigned_abs() as f64 / state.reference_price as f64;
        if deviation >= config.halt_threshold && state.state == CircuitState::Normal {
            state.state = CircuitState::Halted;
            state.halt_end = now + config.halt_duration_micros;
            state.trigger_count += 1;
            info!(symbol, price, "circuit breaker halted symbol on trade");
        }
    }

    pub fn state(&self, symbol: &str) -> CircuitState {
        self.states.get(symbol).map(|s| s.state).unwrap_or(CircuitState::Normal)
    }

    pub fn halt_symbol(&self, symbol: &str, duration_micros: u64) {
        let now = now_micros();
        let mut state = self
            .states
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolCircuitState::new(now));
        state.state = CircuitState::Halted;
        state.halt_end = now + duration_micros;
    }

    pub fn halt_market(&self) {
        self.market_halted.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn resume_market(&self) {
        self.market_halted.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_market_halted(&self) -> bool {
        self.market_halted.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Convenience for C5/C12: translates the current state into the
    /// §7 rejection error, or `Ok(())` if trading is permitted.
    pub fn enforce(&self, symbol: &str, side: Side, price: Price) -> Result<(), ExchangeError> {
        match self.check_order(symbol, side, price) {
            CircuitState::Normal | CircuitState::Auction => Ok(()),
            CircuitState::LimitUp => Err(ExchangeError::SymbolLimitUp {
                symbol: symbol.to_string(),
            }),
            CircuitState::LimitDown => Err(ExchangeError::SymbolLimitDown {
                symbol: symbol.to_string(),
            }),
            CircuitState::Halted if self.is_market_halted() => Err(ExchangeError::MarketHalted),
            CircuitState::Halted => Err(ExchangeError::SymbolHalted {
                symbol: symbol.to_string(),
            }),
        }
    }
}
