//! Command/response shapes for C11, generalized from the teacher's
//! `orderbook/sequencer/types.rs` `SequencerCommand`/`SequencerResult`
//! pair to the full mutating-operation list in §4.11/§5 (submit, cancel,
//! modify, deposit, withdraw, margin adjust, mark update, halt/resume,
//! funding) instead of the teacher's order-book-only command set.

use crate::error::ExchangeError;
use crate::orderbook::{Order, Trade};
use crate::position::Account;
use crate::types::{OrderId, OrderType, Price, Side, Symbol};

#[derive(Debug, Clone)]
pub enum Command {
    SubmitOrder {
        symbol: Symbol,
        user: String,
        side: Side,
        order_type: OrderType,
        price: Price,
        stop_price: Price,
        quantity: i64,
        client_id: Option<String>,
    },
    CancelOrder {
        symbol: Symbol,
        order_id: OrderId,
    },
    ModifyOrder {
        symbol: Symbol,
        order_id: OrderId,
        new_price: Option<Price>,
        new_quantity: Option<i64>,
    },
    Deposit {
        user: String,
        amount: i64,
    },
    Withdraw {
        user: String,
        amount: i64,
    },
    AdjustMargin {
        user: String,
        symbol: Symbol,
        delta: i64,
    },
    MarkUpdate {
        symbol: Symbol,
        reference_price: Price,
    },
    HaltSymbol {
        symbol: Symbol,
        duration_micros: u64,
    },
    HaltMarket {
        duration_micros: u64,
    },
    ResumeMarket,
    SettleFunding {
        symbol: Symbol,
    },
}

#[derive(Debug, Clone)]
pub enum CommandResponse {
    OrderAccepted { order: Order, trades: Vec<Trade> },
    OrderCancelled { order: Order },
    OrderModified { order: Order, trades: Vec<Trade> },
    Account(Account),
    Ack,
    Error(ExchangeError),
}
