//! C2 — Rate Provider: thread-safe FX rate cache with a three-tier
//! fallback chain (§4.2).
//!
//! Grounded on `original_source/src/rate_provider.h`'s `RateEntry`,
//! `update_rate`/`get_rate` and `get_usd_mnt()`'s live → env-var →
//! compiled-default chain, and its direct/inverted cross-rate helpers,
//! generalized from the USD/MNT-specific naming into a generic pair
//! table. Backed by `DashMap` for the same reason as the catalog (C1):
//! readers must never block behind the sequencer.

use std::env;

use dashmap::DashMap;

use crate::utils::now_micros;

#[derive(Debug, Clone, Copy)]
pub struct RateEntry {
    pub rate: f64,
    pub last_update_micros: u64,
}

pub struct RateProvider {
    rates: DashMap<String, RateEntry>,
    env_var: String,
    compiled_default: f64,
}

impl RateProvider {
    /// `env_var` is the fallback environment variable consulted when no
    /// live rate has been observed yet (tier 2); `compiled_default` is the
    /// last-resort constant (tier 3).
    pub fn new(env_var: impl Into<String>, compiled_default: f64) -> Self {
        Self {
            rates: DashMap::new(),
            env_var: env_var.into(),
            compiled_default,
        }
    }

    /// Record a freshly observed live rate for `pair`.
    pub fn update_rate(&self, pair: &str, rate: f64) {
        self.rates.insert(
            pair.to_string(),
            RateEntry {
                rate,
                last_update_micros: now_micros(),
            },
        );
    }

    /// Raw lookup: `None` if no live value has ever been recorded.
    pub fn get_live(&self, pair: &str) -> Option<RateEntry> {
        self.rates.get(pair).map(|e| *e)
    }

    /// The primary-rate lookup policy (§4.2): live value, else env var,
    /// else compiled default. Never blocks; a reader sees at least the
    /// most recent rate observed before the read began.
    pub fn get_rate(&self, pair: &str) -> f64 {
        if let Some(entry) = self.get_live(pair) {
            return entry.rate;
        }
        if let Ok(raw) = env::var(&self.env_var) {
            if let Ok(parsed) = raw.parse::<f64>() {
                return parsed;
            }
        }
        self.compiled_default
    }

    pub fn has_live_rate(&self, pair: &str) -> bool {
        self.rates.contains_key(pair)
    }

    /// Direct cross: `foreign_per_usd * usd_per_quote`.
    pub fn cross_direct(&self, foreign_per_usd_pair: &str, usd_per_quote_pair: &str) -> f64 {
        self.get_rate(foreign_per_usd_pair) * self.get_rate(usd_per_quote_pair)
    }

    /// Inverted cross: `usd_per_quote / usd_per_foreign`.
    pub fn cross_inverted(&self, usd_per_quote_pair: &str, usd_per_foreign_pair: &str) -> f64 {
        let usd_per_foreign = self.get_rate(usd_per_foreign_pair);
        if usd_per_foreign == 0.0 {
            return 0.0;
        }
        self.get_rate(usd_per_quote_pair) / usd_per_foreign
    }
}
