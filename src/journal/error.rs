//! C3's narrow, internal error type. Grounded on the teacher's
//! `orderbook/sequencer/error.rs` `JournalError`, but derived with
//! `thiserror` instead of hand-written `Display` — the teacher depends
//! on `thiserror` without using it anywhere in the sampled modules; this
//! crate gives it a real call site here and in `SequencerError`, while
//! the single most call-site-visible type (`ExchangeError`, §7) stays
//! hand-written in the teacher's manual style.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal corrupt: {0}")]
    Corrupt(String),

    #[error("journal record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("journal writer lock poisoned")]
    LockPoisoned,
}
