//! C11 — Command Sequencer: the single-consumer serialization point for
//! every mutating operation (§4.11).

pub mod error;
pub mod types;
pub mod worker;

pub use error::SequencerError;
pub use types::{Command, CommandResponse};
pub use worker::Sequencer;
