//! Logical event shapes for C3, one per row of spec §6's event table.
//! `FileJournal` encodes these into the fixed binary payload shapes; this
//! module only carries the Rust-native field types components construct.

use crate::types::{OrderId, OrderType, Price, Side, TradeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventType {
    OrderNew = 1,
    Trade = 4,
    Deposit = 5,
    Withdrawal = 6,
    MarginLock = 9,
    MarginRelease = 10,
    Liquidation = 11,
    FundingPayment = 12,
    InsuranceContribution = 13,
    InsurancePayout = 14,
    FeeCollection = 15,
}

#[derive(Debug, Clone)]
pub enum JournalEvent {
    OrderNew {
        id: OrderId,
        symbol: String,
        user: String,
        side: Side,
        order_type: OrderType,
        price_micro: Price,
        qty: i64,
        ts: u64,
    },
    Trade {
        id: TradeId,
        symbol: String,
        maker_user: String,
        taker_user: String,
        maker_oid: OrderId,
        taker_oid: OrderId,
        taker_side: Side,
        price_micro: Price,
        qty: i64,
        maker_fee: i64,
        taker_fee: i64,
        ts: u64,
    },
    Deposit {
        user: String,
        currency: String,
        amount: i64,
        ts: u64,
    },
    Withdrawal {
        user: String,
        currency: String,
        amount: i64,
        ts: u64,
    },
    MarginLock {
        user: String,
        symbol: String,
        amount: i64,
        balance_after: i64,
        ts: u64,
    },
    MarginRelease {
        user: String,
        symbol: String,
        amount: i64,
        balance_after: i64,
        ts: u64,
    },
    Liquidation {
        user: String,
        symbol: String,
        size: i64,
        mark: Price,
        pnl: i64,
        insurance_draw: i64,
        ts: u64,
    },
    FundingPayment {
        user: String,
        symbol: String,
        size: i64,
        rate: f64,
        payment: i64,
        ts: u64,
    },
    InsuranceContribution {
        amount: i64,
        balance_after: i64,
        source: String,
        ts: u64,
    },
    InsurancePayout {
        amount: i64,
        balance_after: i64,
        source: String,
        ts: u64,
    },
    FeeCollection {
        user: String,
        symbol: String,
        amount: i64,
        fee_type: String,
        ts: u64,
    },
}

impl JournalEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            JournalEvent::OrderNew { .. } => EventType::OrderNew,
            JournalEvent::Trade { .. } => EventType::Trade,
            JournalEvent::Deposit { .. } => EventType::Deposit,
            JournalEvent::Withdrawal { .. } => EventType::Withdrawal,
            JournalEvent::MarginLock { .. } => EventType::MarginLock,
            JournalEvent::MarginRelease { .. } => EventType::MarginRelease,
            JournalEvent::Liquidation { .. } => EventType::Liquidation,
            JournalEvent::FundingPayment { .. } => EventType::FundingPayment,
            JournalEvent::InsuranceContribution { .. } => EventType::InsuranceContribution,
            JournalEvent::InsurancePayout { .. } => EventType::InsurancePayout,
            JournalEvent::FeeCollection { .. } => EventType::FeeCollection,
        }
    }

    /// Flush discipline (§4.3): trade/deposit/withdrawal/liquidation/
    /// insurance/margin events flush immediately; funding/fee events may
    /// batch.
    pub fn requires_immediate_flush(&self) -> bool {
        !matches!(
            self,
            JournalEvent::FundingPayment { .. } | JournalEvent::FeeCollection { .. }
        )
    }
}
