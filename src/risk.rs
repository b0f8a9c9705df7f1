//! C7 — Pre-Trade Risk Engine (§4.7). Grounded on
//! `original_source/src/risk_engine.h`'s `RiskEngine::check_order`,
//! restructured into the 7-step sequence spec §4.7 names; the teacher's
//! `Mutex<HashMap<...>>` singleton (`RiskEngine::instance()`) becomes a
//! `DashMap`-per-user state, following the teacher's own `dashmap`
//! idiom used elsewhere in this crate instead of a global singleton.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::error::ExchangeError;
use crate::types::{Price, Side, Symbol};
use crate::utils::now_micros;

const ONE_SECOND_MICROS: u64 = 1_000_000;
const MICROS_PER_DAY: u64 = 86_400_000_000;

#[derive(Debug, Clone)]
pub struct UserRiskLimits {
    pub max_position_notional: i64,
    pub daily_loss_limit: i64,
    pub max_orders_per_second: usize,
    pub fat_finger_threshold: f64,
}

impl Default for UserRiskLimits {
    fn default() -> Self {
        Self {
            max_position_notional: 10_000_000_000_000,
            daily_loss_limit: 1_000_000_000_000,
            max_orders_per_second: 50,
            fat_finger_threshold: 0.1,
        }
    }
}

#[derive(Debug, Default)]
struct UserRiskState {
    positions: std::collections::HashMap<Symbol, i64>,
    daily_pnl: i64,
    order_timestamps: VecDeque<u64>,
    blocked: bool,
    last_reset_micros: u64,
}

pub struct RiskEngine {
    default_limits: UserRiskLimits,
    user_limits: DashMap<String, UserRiskLimits>,
    state: DashMap<String, UserRiskState>,
}

impl RiskEngine {
    pub fn new(default_limits: UserRiskLimits) -> Self {
        Self {
            default_limits,
            user_limits: DashMap::new(),
            state: DashMap::new(),
        }
    }

    pub fn set_user_limits(&self, user: &str, limits: UserRiskLimits) {
        self.user_limits.insert(user.to_string(), limits);
    }

    fn limits_for(&self, user: &str) -> UserRiskLimits {
        self.user_limits
            .get(user)
            .map(|l| l.clone())
            .unwrap_or_else(|| self.default_limits.clone())
    }

    /// The 7-step sequence from §4.7.
    pub fn check_order(
        &self,
        user: &str,
        symbol: &str,
        side: Side,
        price: Price,
        qty: i64,
        reference_price: Price,
    ) -> Result<(), ExchangeError> {
        let limits = self.limits_for(user);
        let mut state = self
            .state
            .entry(user.to_string())
            .or_insert_with(UserRiskState::default);
        let now = now_micros();

        // 2. Auto-reset blocked + daily PnL if the trading day changed.
        if now / MICROS_PER_DAY != state.last_reset_micros / MICROS_PER_DAY {
            state.daily_pnl = 0;
            state.blocked = false;
            state.last_reset_micros = now;
        }

        // 1. Blocked flag short-circuits everything.
        if state.blocked {
            return Err(ExchangeError::DailyLossLimit {
                user: user.to_string(),
            });
        }

        // 3. Purge stale timestamps, check the rolling window.
        let window_start = now.saturating_sub(ONE_SECOND_MICROS);
        while matches!(state.order_timestamps.front(), Some(ts) if *ts < window_start) {
            state.order_timestamps.pop_front();
        }
        if state.order_timestamps.len() >= limits.max_orders_per_second {
            return Err(ExchangeError::RateLimitExceeded {
                user: user.to_string(),
            });
        }

        // 4. Projected position against the notional limit.
        let current = *state.positions.get(symbol).unwrap_or(&0);
        let signed_qty = match side {
            Side::Buy => qty,
            Side::Sell => -qty,
        };
        let projected_notional = (current + signed_qty).unsigned_abs() as i64 * price;
        if projected_notional > limits.max_position_notional {
            return Err(ExchangeError::PositionLimitExceeded {
                user: user.to_string(),
                symbol: symbol.to_string(),
            });
        }

        // 5. Fat-finger deviation from the reference price.
        if reference_price > 0 {
            let deviation = (price - reference_price).unsigned_abs() as f64 / reference_price as f64;
            if deviation > limits.fat_finger_threshold {
                return Err(ExchangeError::FatFingerPrice {
                    price,
                    reference: reference_price,
                });
            }
        }

        // 6. Daily loss limit.
        if state.daily_pnl < -limits.daily_loss_limit {
            state.blocked = true;
            warn!(user, daily_pnl = state.daily_pnl, "user blocked: daily loss limit breached");
            return Err(ExchangeError::DailyLossLimit {
                user: user.to_string(),
            });
        }

        // 7. Record the order and accept.
        state.order_timestamps.push_back(now);
        Ok(())
    }

    pub fn update_position(&self, user: &str, symbol: &str, delta: i64, realized_pnl_delta: i64) {
        let limits = self.limits_for(user);
        let mut state = self
            .state
            .entry(user.to_string())
            .or_insert_with(UserRiskState::default);
        *state.positions.entry(symbol.to_string()).or_insert(0) += delta;
        state.daily_pnl += realized_pnl_delta;
        if state.daily_pnl < -limits.daily_loss_limit {
            state.blocked = true;
            warn!(user, daily_pnl = state.daily_pnl, "user blocked: daily loss limit breached");
        }
    }

    pub fn reset_daily_pnl(&self) {
        let now = now_micros();
        for mut entry in self.state.iter_mut() {
            entry.daily_pnl = 0;
            entry.blocked = false;
            entry.last_reset_micros = now;
        }
    }

    pub fn unblock_user(&self, user: &str) {
        if let Some(mut state) = self.state.get_mut(user) {
            state.blocked = false;
        }
    }

    pub fn is_blocked(&self, user: &str) -> bool {
        self.state.get(user).map(|s| s.blocked).unwrap_or(false)
    }
}

pub fn shared(default_limits: UserRiskLimits) -> Arc<RiskEngine> {
    Arc::new(RiskEngine::new(default_limits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_order_within_all_limits() {
        let engine = RiskEngine::new(UserRiskLimits::default());
        assert!(engine
            .check_order("u1", "XAU-PERP", Side::Buy, 3_500_000_000, 1, 3_500_000_000)
            .is_ok());
    }

    #[test]
    fn rejects_when_position_limit_exceeded() {
        let engine = RiskEngine::new(UserRiskLimits {
            max_position_notional: 100,
            ..Default::default()
        });
        let err = engine
            .check_order("u1", "XAU-PERP", Side::Buy, 10, 100, 0)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::PositionLimitExceeded { .. }));
    }

    #[test]
    fn rejects_fat_finger_price() {
        let engine = RiskEngine::new(UserRiskLimits {
            fat_finger_threshold: 0.01,
            ..Default::default()
        });
        let err = engine
            .check_order("u1", "XAU-PERP", Side::Buy, 200, 1, 100)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::FatFingerPrice { .. }));
    }

    #[test]
    fn rate_limit_trips_after_max_orders_per_second() {
        let engine = RiskEngine::new(UserRiskLimits {
            max_orders_per_second: 2,
            ..Default::default()
        });
        engine.check_order("u1", "XAU-PERP", Side::Buy, 100, 1, 0).unwrap();
        engine.check_order("u1", "XAU-PERP", Side::Buy, 100, 1, 0).unwrap();
        let err = engine
            .check_order("u1", "XAU-PERP", Side::Buy, 100, 1, 0)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::RateLimitExceeded { .. }));
    }

    #[test]
    fn breaching_daily_loss_limit_blocks_subsequent_orders() {
        let engine = RiskEngine::new(UserRiskLimits::default());
        engine.update_position("u1", "XAU-PERP", 0, -2_000_000_000_000);
        let err = engine
            .check_order("u1", "XAU-PERP", Side::Buy, 100, 1, 0)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::DailyLossLimit { .. }));
        engine.unblock_user("u1");
        assert!(!engine.is_blocked("u1"));
    }
}
